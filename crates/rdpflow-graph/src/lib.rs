//! A small streaming dataflow framework: graph elements with named pads,
//! links connecting exactly one producer pad to one consumer pad in push or
//! pull mode, and pipelines composing them.
//!
//! A link and the elements it connects are designed to run within one
//! logical thread; the two directions of a connection are independent (the
//! socket adapter runs the outbound loop on a dedicated thread). Buffers
//! are immutable once frozen, so nothing here needs more synchronization
//! than the per-element and per-link mutexes.

mod element;
mod error;
mod event;
mod link;
mod pipeline;
mod socket;
mod switch;
#[cfg(test)]
pub(crate) mod testutil;

pub use element::{element_ref, Element, ElementCore, ElementRef, DEFAULT_SINK_PAD, DEFAULT_SRC_PAD};
pub use error::{GraphError, GraphResult};
pub use event::{Direction, Event};
pub use link::{link_elements, Link, LinkRef};
pub use pipeline::Pipeline;
pub use socket::{SocketSink, SocketSource, SocketStreamHandle, SocketWrapper};
pub use switch::{OneTimeLogic, OneTimeSwitch, SwitchCtx, ONE_TIME_PAD};

use std::sync::{Mutex, MutexGuard};

/// Locks a mutex, recovering the guard when a previous holder panicked.
/// The graph's state stays usable for teardown even after a failure.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
