use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rdpflow_core::Buffer;

use crate::link::LinkRef;
use crate::{Direction, Event, GraphError, GraphResult};

/// Default input pad name.
pub const DEFAULT_SINK_PAD: &str = "stdin";
/// Default output pad name.
pub const DEFAULT_SRC_PAD: &str = "stdout";

pub type ElementRef = Arc<Mutex<dyn Element + Send>>;

/// Wraps a concrete element into the shared handle the graph works with.
pub fn element_ref<E: Element + Send + 'static>(element: E) -> ElementRef {
    Arc::new(Mutex::new(element))
}

/// A graph node with named input and output pads.
///
/// Data arrives through [`handle_data`](Element::handle_data), out-of-band
/// control through [`handle_event`](Element::handle_event). Source-like
/// elements are driven through [`poll`](Element::poll) when their link
/// operates in pull mode.
pub trait Element: Send {
    fn core(&self) -> &ElementCore;

    fn core_mut(&mut self) -> &mut ElementCore;

    fn id(&self) -> &str {
        self.core().id()
    }

    /// Wires `link` to the named pad. An existing link on the pad is
    /// replaced (the graph rewires itself mid-flight during handshake
    /// switch-off).
    fn set_link(&mut self, pad: &str, link: LinkRef, direction: Direction) {
        self.core_mut().set_link(pad, link, direction);
    }

    fn drop_link(&mut self, pad: &str, direction: Direction) -> Option<LinkRef> {
        self.core_mut().drop_link(pad, direction)
    }

    /// Data-arrival callback. `link` identifies which inbound link
    /// delivered the buffer, so parsers can push unconsumed bytes back.
    fn handle_data(&mut self, buf: Buffer, link: &LinkRef) -> GraphResult<()>;

    /// Out-of-band event callback. The default forwards the event along
    /// the given direction.
    fn handle_event(&mut self, event: Event, direction: Direction) -> GraphResult<()> {
        self.core().forward_event(event, direction)
    }

    /// Asks a source-like element to produce data into its output links.
    /// `block` allows waiting on the underlying I/O. The default is a
    /// no-op for elements whose data arrives by push.
    fn poll(&mut self, block: bool) -> GraphResult<()> {
        let _ = block;
        Ok(())
    }

    /// Fails when any pad the element declares mandatory is unconnected.
    fn validate(&self) -> GraphResult<()> {
        self.core().validate()
    }
}

/// Pad bookkeeping embedded by every element: the id and the pad-name →
/// link maps for both directions.
#[derive(Debug, Default)]
pub struct ElementCore {
    id: String,
    inputs: HashMap<String, LinkRef>,
    outputs: HashMap<String, LinkRef>,
    mandatory_inputs: Vec<&'static str>,
    mandatory_outputs: Vec<&'static str>,
}

impl ElementCore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Declares pads that [`validate`](ElementCore::validate) requires to
    /// be wired.
    pub fn require_pads(mut self, inputs: &[&'static str], outputs: &[&'static str]) -> Self {
        self.mandatory_inputs.extend_from_slice(inputs);
        self.mandatory_outputs.extend_from_slice(outputs);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn map(&self, direction: Direction) -> &HashMap<String, LinkRef> {
        match direction {
            Direction::In => &self.inputs,
            Direction::Out => &self.outputs,
        }
    }

    fn map_mut(&mut self, direction: Direction) -> &mut HashMap<String, LinkRef> {
        match direction {
            Direction::In => &mut self.inputs,
            Direction::Out => &mut self.outputs,
        }
    }

    pub fn set_link(&mut self, pad: &str, link: LinkRef, direction: Direction) {
        self.map_mut(direction).insert(pad.to_owned(), link);
    }

    pub fn drop_link(&mut self, pad: &str, direction: Direction) -> Option<LinkRef> {
        self.map_mut(direction).remove(pad)
    }

    /// Unwires every pad, returning the dropped links.
    pub fn drop_all_links(&mut self) -> Vec<LinkRef> {
        self.inputs
            .drain()
            .chain(self.outputs.drain())
            .map(|(_, link)| link)
            .collect()
    }

    pub fn link(&self, pad: &str, direction: Direction) -> Option<&LinkRef> {
        self.map(direction).get(pad)
    }

    pub fn links(&self, direction: Direction) -> impl Iterator<Item = &LinkRef> {
        self.map(direction).values()
    }

    fn require_link(&self, pad: &str, direction: Direction) -> GraphResult<&LinkRef> {
        self.map(direction)
            .get(pad)
            .ok_or_else(|| GraphError::NoSuchPad {
                element: self.id.clone(),
                pad: pad.to_owned(),
            })
    }

    /// Pushes a buffer into the link wired to the named output pad.
    pub fn send_out(&self, pad: &str, buf: Buffer) -> GraphResult<()> {
        self.require_link(pad, Direction::Out)?.send_data(buf)
    }

    /// Forwards an event to every link of the given direction.
    pub fn forward_event(&self, event: Event, direction: Direction) -> GraphResult<()> {
        for link in self.map(direction).values() {
            link.send_event(event, direction)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> GraphResult<()> {
        let unwired = |pads: &[&'static str], map: &HashMap<String, LinkRef>| {
            pads.iter().find(|pad| !map.contains_key(**pad)).copied()
        };
        if let Some(pad) = unwired(&self.mandatory_inputs, &self.inputs) {
            return Err(GraphError::PadNotConnected {
                element: self.id.clone(),
                pad: pad.to_owned(),
            });
        }
        if let Some(pad) = unwired(&self.mandatory_outputs, &self.outputs) {
            return Err(GraphError::PadNotConnected {
                element: self.id.clone(),
                pad: pad.to_owned(),
            });
        }
        Ok(())
    }
}
