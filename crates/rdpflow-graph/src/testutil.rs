//! Small elements shared by the graph tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rdpflow_core::Buffer;

use crate::element::{ElementCore, DEFAULT_SINK_PAD, DEFAULT_SRC_PAD};
use crate::link::LinkRef;
use crate::{element_ref, Direction, Element, ElementRef, Event, GraphResult};

pub(crate) type Received = Arc<Mutex<Vec<Buffer>>>;
pub(crate) type Seen = Arc<Mutex<Vec<(Event, Direction)>>>;

/// Terminal sink recording everything it receives.
pub(crate) struct Collector {
    core: ElementCore,
    received: Received,
    events: Seen,
}

pub(crate) fn collector(id: &str) -> (ElementRef, Received, Seen) {
    let received = Received::default();
    let events = Seen::default();
    let element = element_ref(Collector {
        core: ElementCore::new(id),
        received: Arc::clone(&received),
        events: Arc::clone(&events),
    });
    (element, received, events)
}

impl Element for Collector {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        crate::lock(&self.received).push(buf);
        Ok(())
    }

    fn handle_event(&mut self, event: Event, direction: Direction) -> GraphResult<()> {
        crate::lock(&self.events).push((event, direction));
        self.core.forward_event(event, direction)
    }
}

/// Forwards every buffer unchanged from `stdin` to `stdout`.
pub(crate) struct Passthrough {
    core: ElementCore,
}

pub(crate) fn passthrough(id: &str) -> ElementRef {
    element_ref(Passthrough {
        core: ElementCore::new(id).require_pads(&[DEFAULT_SINK_PAD], &[DEFAULT_SRC_PAD]),
    })
}

impl Element for Passthrough {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        self.core.send_out(DEFAULT_SRC_PAD, buf)
    }
}

/// Pull-driven source feeding from a queue of predefined chunks.
pub(crate) struct QueueSource {
    core: ElementCore,
    chunks: Arc<Mutex<VecDeque<Buffer>>>,
}

pub(crate) fn queue_source(id: &str, chunks: &[&'static [u8]]) -> ElementRef {
    element_ref(QueueSource {
        core: ElementCore::new(id),
        chunks: Arc::new(Mutex::new(
            chunks.iter().map(|c| Buffer::from_static(c)).collect(),
        )),
    })
}

impl Element for QueueSource {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, _buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        unreachable!("queue source has no input pads")
    }

    fn poll(&mut self, _block: bool) -> GraphResult<()> {
        let next = crate::lock(&self.chunks).pop_front();
        match next {
            Some(buf) => self.core.send_out(DEFAULT_SRC_PAD, buf),
            None => Ok(()),
        }
    }
}
