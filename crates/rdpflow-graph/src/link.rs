use core::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use rdpflow_core::Buffer;
use tracing::trace;

use crate::element::ElementRef;
use crate::{lock, Direction, Element as _, Event, GraphError, GraphResult};

/// Delay inserted when a pull yields no data, bounding the busy-wait of
/// the pull-mode main loop.
const PULL_IDLE_DELAY: Duration = Duration::from_millis(5);

pub type LinkRef = Arc<Link>;

struct Endpoint {
    element: Weak<Mutex<dyn crate::Element + Send>>,
    pad: String,
}

#[derive(Default)]
struct LinkState {
    source: Option<Endpoint>,
    sink: Option<Endpoint>,
    /// Partial-packet reassembly cache.
    cache: Option<Buffer>,
    /// When non-zero, cached data is delivered only once at least this
    /// many bytes are available.
    expected_packet_size: usize,
    paused: bool,
    /// Re-entrancy guard: set while a buffer is being handed to an
    /// endpoint, so nested sends cache instead of recursing.
    held: bool,
    pull_mode: bool,
    started: bool,
    closed: bool,
    shutdown: bool,
}

impl LinkState {
    fn cache_ready(&self) -> bool {
        match &self.cache {
            Some(cache) => self.expected_packet_size == 0 || cache.len() >= self.expected_packet_size,
            None => false,
        }
    }

    /// Takes the cache for delivery and resets the size constraint, which
    /// is per-packet.
    fn take_ready(&mut self) -> Option<Buffer> {
        if self.cache_ready() {
            self.expected_packet_size = 0;
            self.cache.take()
        } else {
            None
        }
    }
}

/// A point-to-point channel wiring exactly one producer pad to exactly one
/// consumer pad.
///
/// In push mode the producer's [`send_data`](Link::send_data) drives the
/// consumer; in pull mode the consumer (usually a main loop started
/// through [`run`](Link::run)) actively requests data from the producer.
/// Endpoint references are weak: a link never keeps its elements alive.
pub struct Link {
    id: String,
    state: Mutex<LinkState>,
}

impl Link {
    pub fn new(id: impl Into<String>) -> LinkRef {
        Arc::new(Self {
            id: id.into(),
            state: Mutex::new(LinkState::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_source(&self, element: &ElementRef, pad: &str) {
        lock(&self.state).source = Some(Endpoint {
            element: Arc::downgrade(element),
            pad: pad.to_owned(),
        });
    }

    pub fn set_sink(&self, element: &ElementRef, pad: &str) {
        lock(&self.state).sink = Some(Endpoint {
            element: Arc::downgrade(element),
            pad: pad.to_owned(),
        });
    }

    /// The downstream element and pad, if still alive.
    pub fn sink_endpoint(&self) -> Option<(ElementRef, String)> {
        let st = lock(&self.state);
        let endpoint = st.sink.as_ref()?;
        Some((endpoint.element.upgrade()?, endpoint.pad.clone()))
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Marks the start event as already seen, for main loops that must
    /// not wait for one.
    pub fn mark_started(&self) {
        lock(&self.state).started = true;
    }

    /// Suspends delivery; pushed data accumulates in the cache.
    pub fn pause(&self) {
        lock(&self.state).paused = true;
    }

    /// Resumes delivery and drains anything cached while paused.
    pub fn resume(self: &Arc<Self>) -> GraphResult<()> {
        lock(&self.state).paused = false;
        self.drain()
    }

    pub fn set_expected_packet_size(&self, size: usize) {
        lock(&self.state).expected_packet_size = size;
    }

    /// Marks the link closed without delivering an event. Used by teardown
    /// paths that walk the graph themselves.
    pub fn close(&self) {
        let mut st = lock(&self.state);
        st.closed = true;
    }

    /// Permanently retires the link after a splice.
    ///
    /// # Panics
    ///
    /// Panics when cached data would be lost; dropping a link that still
    /// holds bytes is a programming error.
    pub fn shutdown(&self) {
        let mut st = lock(&self.state);
        assert!(
            st.cache.is_none(),
            "link `{}` shut down with pending cached data",
            self.id
        );
        st.shutdown = true;
        st.closed = true;
    }

    /// Push-mode entry point: combines `buf` with any cached data and
    /// delivers as much as the pause/hold/expected-size constraints allow.
    pub fn send_data(self: &Arc<Self>, buf: Buffer) -> GraphResult<()> {
        {
            let mut st = lock(&self.state);
            if st.shutdown {
                return Err(GraphError::LinkClosed(self.id.clone()));
            }
            st.cache = Some(match st.cache.take() {
                Some(cache) => cache.join(&buf),
                None => buf,
            });
        }
        self.drain()
    }

    /// Re-queues data the consumer did not consume (e.g. a parser that
    /// received more than one logical packet) in front of the cache, and
    /// optionally installs the size the consumer needs next.
    pub fn push_back(&self, mut buf: Buffer, expected_size: Option<usize>) {
        buf.rewind();
        let mut st = lock(&self.state);
        st.cache = Some(match st.cache.take() {
            Some(cache) => buf.join(&cache),
            None => buf,
        });
        if let Some(size) = expected_size {
            st.expected_packet_size = size;
        }
    }

    /// Re-attempts delivery of cached data, e.g. after the graph was
    /// rewired around a spliced-out element.
    pub fn flush(self: &Arc<Self>) -> GraphResult<()> {
        self.drain()
    }

    /// Delivers cached data to the sink while constraints allow.
    ///
    /// The state lock is never held across the call into the sink, so the
    /// sink is free to push back into this link.
    fn drain(self: &Arc<Self>) -> GraphResult<()> {
        loop {
            let (data, sink) = {
                let mut st = lock(&self.state);
                if st.paused || st.held || st.pull_mode {
                    return Ok(());
                }
                let Some(data) = st.take_ready() else {
                    return Ok(());
                };
                st.held = true;
                let sink = st
                    .sink
                    .as_ref()
                    .and_then(|endpoint| endpoint.element.upgrade());
                (data, sink)
            };

            let Some(sink) = sink else {
                lock(&self.state).held = false;
                return Err(GraphError::MissingEndpoint {
                    link: self.id.clone(),
                    end: "sink",
                });
            };

            let result = lock(&sink).handle_data(data, self);
            lock(&self.state).held = false;
            result?;
        }
    }

    /// Pull-mode entry point: serves from the cache when it satisfies the
    /// expected size, otherwise polls the source (which may push into this
    /// same link) and tries again.
    pub fn pull(self: &Arc<Self>, block: bool) -> GraphResult<Option<Buffer>> {
        let source = {
            let mut st = lock(&self.state);
            if let Some(data) = st.take_ready() {
                return Ok(Some(data));
            }
            if st.closed {
                return Ok(None);
            }
            st.held = true;
            st.source
                .as_ref()
                .and_then(|endpoint| endpoint.element.upgrade())
        };

        let result = match &source {
            Some(element) => lock(element).poll(block),
            None => Ok(()),
        };

        let mut st = lock(&self.state);
        st.held = false;
        result?;
        Ok(st.take_ready())
    }

    /// Delivers an event to the endpoint the direction points at.
    /// `StreamStart` and `StreamClose` are idempotent per link.
    pub fn send_event(self: &Arc<Self>, event: Event, direction: Direction) -> GraphResult<()> {
        let target = {
            let mut st = lock(&self.state);
            match event {
                Event::StreamStart => {
                    if st.started {
                        return Ok(());
                    }
                    st.started = true;
                }
                Event::StreamClose => {
                    if st.closed {
                        return Ok(());
                    }
                    st.closed = true;
                }
                Event::SwitchToPullMode => {
                    st.pull_mode = true;
                }
            }
            let endpoint = match direction {
                Direction::In => st.source.as_ref(),
                Direction::Out => st.sink.as_ref(),
            };
            endpoint.and_then(|e| e.element.upgrade())
        };

        match target {
            Some(element) => lock(&element).handle_event(event, direction),
            None => Ok(()),
        }
    }

    /// Pull-mode main loop: waits for `StreamStart`, switches the upstream
    /// chain to pull mode, then pulls and forwards to the sink until
    /// `StreamClose`.
    pub fn run(self: &Arc<Self>) -> GraphResult<()> {
        loop {
            {
                let st = lock(&self.state);
                if st.closed {
                    return Ok(());
                }
                if st.started {
                    break;
                }
            }
            thread::sleep(PULL_IDLE_DELAY);
        }

        trace!(link = %self.id, "main loop switching upstream to pull mode");
        self.send_event(Event::SwitchToPullMode, Direction::In)?;

        loop {
            if self.is_closed() {
                trace!(link = %self.id, "main loop stopping");
                return Ok(());
            }

            match self.pull(true)? {
                Some(data) => {
                    let sink = lock(&self.state)
                        .sink
                        .as_ref()
                        .and_then(|endpoint| endpoint.element.upgrade())
                        .ok_or_else(|| GraphError::MissingEndpoint {
                            link: self.id.clone(),
                            end: "sink",
                        })?;
                    lock(&sink).handle_data(data, self)?;
                }
                None => thread::sleep(PULL_IDLE_DELAY),
            }
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = lock(&self.state);
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("cached", &st.cache.as_ref().map(Buffer::len))
            .field("expected_packet_size", &st.expected_packet_size)
            .field("paused", &st.paused)
            .field("pull_mode", &st.pull_mode)
            .field("closed", &st.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::element::{ElementCore, DEFAULT_SINK_PAD, DEFAULT_SRC_PAD};
    use crate::testutil::{collector, queue_source};
    use crate::{element_ref, GraphResult};

    #[test]
    fn reassembles_split_packet_into_single_delivery() {
        let (sink, received, _) = collector("sink");
        let link = Link::new("test");
        link.set_sink(&sink, DEFAULT_SINK_PAD);
        link.set_expected_packet_size(10);

        link.send_data(Buffer::from_static(b"abc")).unwrap();
        link.send_data(Buffer::from_static(b"def")).unwrap();
        assert!(lock(&received).is_empty(), "partial packet must stay cached");

        link.send_data(Buffer::from_static(b"ghij")).unwrap();
        let received = lock(&received);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].as_slice(), b"abcdefghij");
    }

    #[test]
    fn pause_caches_and_resume_delivers_in_order() {
        let (sink, received, _) = collector("sink");
        let link = Link::new("test");
        link.set_sink(&sink, DEFAULT_SINK_PAD);

        link.pause();
        link.send_data(Buffer::from_static(b"one")).unwrap();
        link.send_data(Buffer::from_static(b"two")).unwrap();
        assert!(lock(&received).is_empty());

        link.resume().unwrap();
        let received = lock(&received);
        assert_eq!(received.len(), 1, "cached pushes are joined");
        assert_eq!(received[0].as_slice(), b"onetwo");
    }

    /// Consumes fixed-size records and pushes the surplus back, the way
    /// framing parsers do.
    struct RecordSink {
        core: ElementCore,
        record_size: usize,
        records: crate::testutil::Received,
    }

    impl crate::Element for RecordSink {
        fn core(&self) -> &ElementCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ElementCore {
            &mut self.core
        }

        fn handle_data(&mut self, mut buf: Buffer, link: &LinkRef) -> GraphResult<()> {
            if buf.len() < self.record_size {
                link.push_back(buf, Some(self.record_size));
                return Ok(());
            }
            let record = buf.read_slice(self.record_size)?;
            lock(&self.records).push(record);
            if buf.remaining() > 0 {
                link.push_back(buf.read_remaining(), Some(self.record_size));
            }
            Ok(())
        }
    }

    #[test]
    fn push_back_slices_stream_into_records() {
        let records = crate::testutil::Received::default();
        let sink = element_ref(RecordSink {
            core: ElementCore::new("records"),
            record_size: 4,
            records: std::sync::Arc::clone(&records),
        });
        let link = Link::new("test");
        link.set_sink(&sink, DEFAULT_SINK_PAD);

        // Ten bytes across two pushes: two full records, one partial that
        // completes with the second push.
        link.send_data(Buffer::from_static(b"aaaabb")).unwrap();
        link.send_data(Buffer::from_static(b"bbcccc")).unwrap();

        let records = lock(&records);
        let collected: Vec<&[u8]> = records.iter().map(Buffer::as_slice).collect();
        assert_eq!(collected, vec![b"aaaa".as_slice(), b"bbbb", b"cccc"]);
    }

    #[test]
    fn start_and_close_events_are_idempotent_per_link() {
        let (sink, _, events) = collector("sink");
        let link = Link::new("test");
        link.set_sink(&sink, DEFAULT_SINK_PAD);

        link.send_event(Event::StreamStart, Direction::Out).unwrap();
        link.send_event(Event::StreamStart, Direction::Out).unwrap();
        link.send_event(Event::StreamClose, Direction::Out).unwrap();
        link.send_event(Event::StreamClose, Direction::Out).unwrap();

        let events = lock(&events);
        assert_eq!(
            *events,
            vec![
                (Event::StreamStart, Direction::Out),
                (Event::StreamClose, Direction::Out)
            ]
        );
    }

    #[test]
    fn pull_mode_drains_source_on_demand() {
        let source = queue_source("source", &[b"first", b"second"]);
        let (sink, received, _) = collector("sink");
        let link = link_elements("test", &source, DEFAULT_SRC_PAD, &sink, DEFAULT_SINK_PAD);

        link.send_event(Event::SwitchToPullMode, Direction::In).unwrap();

        assert_eq!(link.pull(false).unwrap().unwrap().as_slice(), b"first");
        assert_eq!(link.pull(false).unwrap().unwrap().as_slice(), b"second");
        assert!(link.pull(false).unwrap().is_none());
        assert!(
            lock(&received).is_empty(),
            "pull mode must not push into the sink"
        );
    }

    #[test]
    fn run_loop_forwards_until_close() {
        let source = queue_source("source", &[b"first", b"second"]);
        let (sink, received, _) = collector("sink");
        let link = link_elements("test", &source, DEFAULT_SRC_PAD, &sink, DEFAULT_SINK_PAD);

        let runner = {
            let link = Arc::clone(&link);
            thread::spawn(move || link.run())
        };

        link.send_event(Event::StreamStart, Direction::Out).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while lock(&received).len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        link.close();
        runner.join().expect("run loop panicked").unwrap();

        let received = lock(&received);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].as_slice(), b"first");
        assert_eq!(received[1].as_slice(), b"second");
    }
}

/// Creates a link wiring `source`'s output pad to `sink`'s input pad and
/// registers it on both elements.
pub fn link_elements(
    id: impl Into<String>,
    source: &ElementRef,
    source_pad: &str,
    sink: &ElementRef,
    sink_pad: &str,
) -> LinkRef {
    let link = Link::new(id);
    link.set_source(source, source_pad);
    link.set_sink(sink, sink_pad);
    lock(source).set_link(source_pad, Arc::clone(&link), Direction::Out);
    lock(sink).set_link(sink_pad, Arc::clone(&link), Direction::In);
    link
}
