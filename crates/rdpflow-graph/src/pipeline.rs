use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::element::{ElementRef, DEFAULT_SINK_PAD, DEFAULT_SRC_PAD};
use crate::link::{Link, LinkRef};
use crate::{lock, Direction, Element as _, Event, GraphError, GraphResult};

/// Sentinel element name denoting the pipeline's own outer input.
const SENTINEL_IN: &str = "IN";
/// Sentinel element name denoting the pipeline's own outer output.
const SENTINEL_OUT: &str = "OUT";

/// One entry of the declarative link syntax: an element name optionally
/// carrying an input pad prefix (`"PAD< name"`) and/or an output pad
/// suffix (`"name >PAD"`).
struct LinkSpec<'a> {
    name: &'a str,
    input_pad: &'a str,
    output_pad: &'a str,
}

impl<'a> LinkSpec<'a> {
    fn parse(spec: &'a str) -> GraphResult<Self> {
        let mut rest = spec.trim();
        let mut input_pad = DEFAULT_SINK_PAD;
        let mut output_pad = DEFAULT_SRC_PAD;

        if let Some((pad, tail)) = rest.split_once('<') {
            input_pad = pad.trim();
            rest = tail.trim();
        }
        if let Some((head, pad)) = rest.split_once('>') {
            output_pad = pad.trim();
            rest = head.trim();
        }
        if rest.is_empty() || input_pad.is_empty() || output_pad.is_empty() {
            return Err(GraphError::BadLinkSyntax(spec.to_owned()));
        }

        Ok(Self {
            name: rest,
            input_pad,
            output_pad,
        })
    }
}

/// A named container composing elements and the links wiring them.
#[derive(Default)]
pub struct Pipeline {
    id: String,
    elements: HashMap<String, ElementRef>,
    /// Half-bound links representing the pipeline's outer interface,
    /// keyed by sentinel name.
    external: HashMap<String, LinkRef>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add(&mut self, element: ElementRef) {
        let id = lock(&element).id().to_owned();
        self.elements.insert(id, element);
    }

    pub fn get(&self, name: &str) -> Option<&ElementRef> {
        self.elements.get(name)
    }

    /// The half-bound link created for an `IN`/`OUT` sentinel, through
    /// which the embedder pushes data in or receives data out.
    pub fn external_link(&self, sentinel: &str) -> Option<&LinkRef> {
        self.external.get(sentinel)
    }

    fn require(&self, name: &str) -> GraphResult<&ElementRef> {
        self.elements
            .get(name)
            .ok_or_else(|| GraphError::UnknownElement(name.to_owned()))
    }

    /// Adds all elements and links them in order with default pads.
    pub fn add_and_link(&mut self, elements: &[ElementRef]) -> GraphResult<()> {
        let mut names = Vec::with_capacity(elements.len());
        for element in elements {
            names.push(lock(element).id().to_owned());
            self.add(Arc::clone(element));
        }
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.link(&name_refs)
    }

    /// Wires the named elements into a chain. Each name may select
    /// non-default pads (`"PAD< name"`, `"name >PAD"`); `IN` and `OUT`
    /// denote the pipeline's own outer interface.
    pub fn link(&mut self, names: &[&str]) -> GraphResult<()> {
        for pair in names.windows(2) {
            let (left, right) = (pair[0], pair[1]);

            if left == SENTINEL_IN {
                let spec = LinkSpec::parse(right)?;
                let sink = self.require(spec.name)?;
                let link = Link::new(format!("{}:IN:{}", self.id, spec.name));
                link.set_sink(sink, spec.input_pad);
                lock(sink).set_link(spec.input_pad, Arc::clone(&link), Direction::In);
                self.external.insert(SENTINEL_IN.to_owned(), link);
                continue;
            }
            if right == SENTINEL_OUT {
                let spec = LinkSpec::parse(left)?;
                let source = self.require(spec.name)?;
                let link = Link::new(format!("{}:{}:OUT", self.id, spec.name));
                link.set_source(source, spec.output_pad);
                lock(source).set_link(spec.output_pad, Arc::clone(&link), Direction::Out);
                self.external.insert(SENTINEL_OUT.to_owned(), link);
                continue;
            }

            let from = LinkSpec::parse(left)?;
            let to = LinkSpec::parse(right)?;
            let source = Arc::clone(self.require(from.name)?);
            let sink = Arc::clone(self.require(to.name)?);

            let link = Link::new(format!("{}:{}:{}", self.id, from.name, to.name));
            link.set_source(&source, from.output_pad);
            link.set_sink(&sink, to.input_pad);
            lock(&source).set_link(from.output_pad, Arc::clone(&link), Direction::Out);
            lock(&sink).set_link(to.input_pad, Arc::clone(&link), Direction::In);
        }
        Ok(())
    }

    /// Starts the run loop of the link wired to `pad` of `element`
    /// (`Direction::In`: the element is the loop's sink), optionally on a
    /// dedicated thread, optionally without waiting for a start event.
    pub fn run_main_loop(
        &self,
        element: &str,
        pad: &str,
        separate_thread: bool,
        wait_for_start_event: bool,
    ) -> GraphResult<Option<JoinHandle<GraphResult<()>>>> {
        let element_ref = self.require(element)?;
        let link = lock(element_ref)
            .core()
            .link(pad, Direction::In)
            .map(Arc::clone)
            .ok_or_else(|| GraphError::NoSuchPad {
                element: element.to_owned(),
                pad: pad.to_owned(),
            })?;

        if !wait_for_start_event {
            link.mark_started();
        }

        debug!(pipeline = %self.id, element, pad, separate_thread, "starting main loop");

        if separate_thread {
            let name = format!("{}:{element}:{pad}", self.id);
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || link.run())
                .map_err(|e| GraphError::io("main loop thread spawn", e))?;
            Ok(Some(handle))
        } else {
            link.run()?;
            Ok(None)
        }
    }

    /// Validates every element's mandatory pads.
    pub fn validate(&self) -> GraphResult<()> {
        for element in self.elements.values() {
            lock(element).validate()?;
        }
        Ok(())
    }

    /// Delivers `StreamStart` to the named element, kicking off its stage.
    pub fn start(&self, element: &str) -> GraphResult<()> {
        lock(self.require(element)?).handle_event(Event::StreamStart, Direction::Out)
    }

    /// Best-effort teardown: marks every link closed and delivers
    /// `StreamClose` to every element, ignoring per-element failures.
    pub fn shutdown(&self) {
        for element in self.elements.values() {
            let links: Vec<LinkRef> = {
                let guard = lock(element);
                guard
                    .core()
                    .links(Direction::In)
                    .chain(guard.core().links(Direction::Out))
                    .map(Arc::clone)
                    .collect()
            };
            for link in links {
                link.close();
            }
        }
        for element in self.elements.values() {
            let mut guard = lock(element);
            // Spliced-out one-time elements have no links left and must
            // not be called again.
            let unwired = guard.core().links(Direction::In).next().is_none()
                && guard.core().links(Direction::Out).next().is_none();
            if unwired {
                continue;
            }
            if let Err(error) = guard.handle_event(Event::StreamClose, Direction::Out) {
                debug!(pipeline = %self.id, %error, "element failed during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::testutil::{collector, passthrough, queue_source};

    #[test]
    fn link_syntax_wires_chain_and_sentinels() {
        let mut pipeline = Pipeline::new("test");
        pipeline.add(passthrough("a"));
        pipeline.add(passthrough("b"));
        let (sink, received, _) = collector("c");
        pipeline.add(sink);

        pipeline.link(&["IN", "a", "b", "c >aux"]).unwrap();
        pipeline.validate().unwrap();

        let outer = Arc::clone(pipeline.external_link("IN").unwrap());
        outer
            .send_data(rdpflow_core::Buffer::from_static(b"ping"))
            .unwrap();

        let received = lock(&received);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].as_slice(), b"ping");
    }

    #[test]
    fn pad_selectors_pick_non_default_pads() {
        let spec = LinkSpec::parse("alt< router >orders").unwrap();
        assert_eq!(spec.name, "router");
        assert_eq!(spec.input_pad, "alt");
        assert_eq!(spec.output_pad, "orders");

        let spec = LinkSpec::parse("tpkt").unwrap();
        assert_eq!(spec.name, "tpkt");
        assert_eq!(spec.input_pad, DEFAULT_SINK_PAD);
        assert_eq!(spec.output_pad, DEFAULT_SRC_PAD);

        assert!(LinkSpec::parse("< nope >").is_err());
    }

    #[test]
    fn validate_reports_unwired_mandatory_pad() {
        let mut pipeline = Pipeline::new("test");
        pipeline.add(passthrough("lonely"));
        let err = pipeline.validate().unwrap_err();
        assert!(matches!(err, GraphError::PadNotConnected { .. }), "{err:?}");
    }

    #[test]
    fn main_loop_runs_on_separate_thread() {
        let mut pipeline = Pipeline::new("test");
        pipeline.add(queue_source("source", &[b"tick"]));
        let (sink, received, _) = collector("sink");
        pipeline.add(sink);
        pipeline.link(&["source", "sink"]).unwrap();

        let handle = pipeline
            .run_main_loop("sink", DEFAULT_SINK_PAD, true, true)
            .unwrap()
            .expect("separate thread requested");

        pipeline.start("source").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while lock(&received).is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        pipeline.shutdown();
        handle.join().expect("main loop panicked").unwrap();

        assert_eq!(lock(&received)[0].as_slice(), b"tick");
    }

    #[test]
    fn external_out_link_receives_forwarded_data() {
        let mut pipeline = Pipeline::new("test");
        pipeline.add(passthrough("a"));
        pipeline.link(&["IN", "a", "OUT"]).unwrap();

        let outer_out = Arc::clone(pipeline.external_link("OUT").unwrap());
        let (probe, received, _) = collector("probe");
        outer_out.set_sink(&probe, DEFAULT_SINK_PAD);

        Arc::clone(pipeline.external_link("IN").unwrap())
            .send_data(rdpflow_core::Buffer::from_static(b"through"))
            .unwrap();

        assert_eq!(lock(&received)[0].as_slice(), b"through");
    }
}
