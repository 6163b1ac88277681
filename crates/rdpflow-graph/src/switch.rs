use rdpflow_core::Buffer;
use tracing::{debug, trace};

use crate::element::{ElementCore, DEFAULT_SINK_PAD, DEFAULT_SRC_PAD};
use crate::link::LinkRef;
use crate::{lock, Direction, Element, Event, GraphResult};

/// Name of the dedicated output pad one-time elements send their one-shot
/// requests through. The link on this pad is dropped at switch-off.
pub const ONE_TIME_PAD: &str = "onetime";

/// The one-shot protocol logic hosted by a [`OneTimeSwitch`].
///
/// Implementations answer a fixed exchange through the hooks below, and
/// call [`SwitchCtx::switch_off`] once their exchange is complete.
pub trait OneTimeLogic: Send {
    /// Runs when the element receives `StreamStart` while still active.
    /// Concrete handshake elements emit their one-shot request here.
    fn on_start(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let _ = ctx;
        Ok(())
    }

    /// Receives all inbound data while the element is active.
    fn handle_one_time_data(&mut self, buf: Buffer, ctx: &mut SwitchCtx<'_>) -> GraphResult<()>;
}

/// Capabilities handed to [`OneTimeLogic`] hooks.
pub struct SwitchCtx<'a> {
    core: &'a ElementCore,
    switch_off: bool,
}

impl SwitchCtx<'_> {
    /// Sends a one-shot request through the dedicated one-time pad.
    pub fn send_one_time(&self, buf: Buffer) -> GraphResult<()> {
        self.core.send_out(ONE_TIME_PAD, buf)
    }

    /// Sends data through the main output pad.
    pub fn send_out(&self, buf: Buffer) -> GraphResult<()> {
        self.core.send_out(DEFAULT_SRC_PAD, buf)
    }

    /// Requests the transition to transparent passthrough once the current
    /// hook returns.
    pub fn switch_off(&mut self) {
        self.switch_off = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchState {
    /// All inbound data is routed to the one-time hook.
    Active,
    /// The element spliced itself out of the graph; it must never be
    /// called again.
    Switched,
}

/// An element for "handshake, then become transparent" behavior.
///
/// While **active**, inbound data goes to the hosted logic's
/// [`handle_one_time_data`](OneTimeLogic::handle_one_time_data) and
/// `StreamStart` triggers [`on_start`](OneTimeLogic::on_start). When the
/// logic calls [`SwitchCtx::switch_off`], the element drops its one-time
/// output link, wakes the next stage with a synthetic `StreamStart`,
/// splices its input link directly onto its downstream neighbor, and drops
/// its remaining links. After that any call into the element is a fatal
/// programming error.
pub struct OneTimeSwitch<L: OneTimeLogic> {
    core: ElementCore,
    state: SwitchState,
    logic: L,
}

impl<L: OneTimeLogic> OneTimeSwitch<L> {
    pub fn new(id: impl Into<String>, logic: L) -> Self {
        Self {
            core: ElementCore::new(id).require_pads(&[DEFAULT_SINK_PAD], &[]),
            state: SwitchState::Active,
            logic,
        }
    }

    pub fn logic(&self) -> &L {
        &self.logic
    }

    fn run_hook(
        &mut self,
        hook: impl FnOnce(&mut L, &mut SwitchCtx<'_>) -> GraphResult<()>,
    ) -> GraphResult<()> {
        let mut ctx = SwitchCtx {
            core: &self.core,
            switch_off: false,
        };
        hook(&mut self.logic, &mut ctx)?;
        if ctx.switch_off {
            self.switch_off()?;
        }
        Ok(())
    }

    /// Splices the element out of the graph. See the type-level docs for
    /// the exact order of operations.
    fn switch_off(&mut self) -> GraphResult<()> {
        debug!(element = self.core.id(), "one-time exchange complete, switching off");
        self.state = SwitchState::Switched;

        if let Some(one_time) = self.core.drop_link(ONE_TIME_PAD, Direction::Out) {
            one_time.shutdown();
        }

        let input = self.core.drop_link(DEFAULT_SINK_PAD, Direction::In);
        let output = self.core.drop_link(DEFAULT_SRC_PAD, Direction::Out);

        let spliced: Option<LinkRef> = match (input, output) {
            (Some(input), Some(output)) => {
                let (downstream, pad) = output.sink_endpoint().ok_or_else(|| {
                    crate::GraphError::MissingEndpoint {
                        link: output.id().to_owned(),
                        end: "sink",
                    }
                })?;

                // Wake the next stage before rewiring, so its on-start
                // request goes out ahead of any data we pass through.
                lock(&downstream).handle_event(Event::StreamStart, Direction::Out)?;

                input.set_sink(&downstream, &pad);
                lock(&downstream).set_link(&pad, LinkRef::clone(&input), Direction::In);
                output.shutdown();
                Some(input)
            }
            (input, output) => {
                if let Some(output) = output {
                    output.shutdown();
                }
                input
            }
        };

        for link in self.core.drop_all_links() {
            link.close();
        }

        // Any bytes the logic pushed back for the next stage are delivered
        // now that the splice points past this element.
        if let Some(input) = spliced {
            trace!(element = self.core.id(), link = input.id(), "flushing spliced link");
            input.flush()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::link_elements;
    use crate::testutil::{collector, passthrough};
    use crate::{element_ref, Link};

    /// Sends one request at start, waits for one answer, then becomes
    /// transparent.
    struct HelloLogic;

    impl OneTimeLogic for HelloLogic {
        fn on_start(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
            ctx.send_one_time(rdpflow_core::Buffer::from_static(b"hello"))
        }

        fn handle_one_time_data(
            &mut self,
            buf: rdpflow_core::Buffer,
            ctx: &mut SwitchCtx<'_>,
        ) -> GraphResult<()> {
            assert_eq!(buf.as_slice(), b"welcome");
            ctx.switch_off();
            Ok(())
        }
    }

    struct Graph {
        upstream: crate::ElementRef,
        switch: crate::ElementRef,
        in_link: crate::LinkRef,
        // Links hold only weak endpoint refs, so the sink elements must be
        // kept alive here for the duration of the test.
        _downstream: crate::ElementRef,
        _request_sink: crate::ElementRef,
        downstream_data: crate::testutil::Received,
        downstream_events: crate::testutil::Seen,
        requests: crate::testutil::Received,
    }

    fn build() -> Graph {
        let upstream = passthrough("upstream");
        let switch = element_ref(OneTimeSwitch::new("switch", HelloLogic));
        let (downstream, downstream_data, downstream_events) = collector("downstream");
        let (request_sink, requests, _) = collector("requests");

        let in_link = link_elements("up:switch", &upstream, DEFAULT_SRC_PAD, &switch, DEFAULT_SINK_PAD);
        link_elements("switch:down", &switch, DEFAULT_SRC_PAD, &downstream, DEFAULT_SINK_PAD);
        link_elements("switch:requests", &switch, ONE_TIME_PAD, &request_sink, DEFAULT_SINK_PAD);

        Graph {
            upstream,
            switch,
            in_link,
            _downstream: downstream,
            _request_sink: request_sink,
            downstream_data,
            downstream_events,
            requests,
        }
    }

    fn feed(graph: &Graph, data: &'static [u8]) {
        // Through the upstream element, as in a live chain.
        let link = Link::new("feed");
        link.set_sink(&graph.upstream, DEFAULT_SINK_PAD);
        link.send_data(rdpflow_core::Buffer::from_static(data)).unwrap();
    }

    #[test]
    fn intercepts_then_splices_itself_out() {
        let graph = build();

        lock(&graph.switch)
            .handle_event(Event::StreamStart, Direction::Out)
            .unwrap();
        assert_eq!(lock(&graph.requests).len(), 1, "one-shot request sent at start");

        feed(&graph, b"welcome");
        assert!(
            lock(&graph.downstream_data).is_empty(),
            "handshake data must not leak downstream"
        );
        assert_eq!(
            *lock(&graph.downstream_events),
            vec![(Event::StreamStart, Direction::Out)],
            "switch-off wakes the next stage"
        );

        // The splice connects upstream directly to downstream.
        feed(&graph, b"payload");
        let downstream = lock(&graph.downstream_data);
        assert_eq!(downstream.len(), 1);
        assert_eq!(downstream[0].as_slice(), b"payload");

        let (sink, pad) = graph.in_link.sink_endpoint().unwrap();
        assert_eq!(lock(&sink).id(), "downstream");
        assert_eq!(pad, DEFAULT_SINK_PAD);
    }

    #[test]
    #[should_panic(expected = "received data after switch-off")]
    fn data_after_switch_off_is_fatal() {
        let graph = build();
        lock(&graph.switch)
            .handle_event(Event::StreamStart, Direction::Out)
            .unwrap();
        feed(&graph, b"welcome");

        let stale = Link::new("stale");
        lock(&graph.switch)
            .handle_data(rdpflow_core::Buffer::from_static(b"late"), &stale)
            .unwrap();
    }

    #[test]
    #[should_panic(expected = "after switch-off")]
    fn event_after_switch_off_is_fatal() {
        let graph = build();
        lock(&graph.switch)
            .handle_event(Event::StreamStart, Direction::Out)
            .unwrap();
        feed(&graph, b"welcome");

        lock(&graph.switch)
            .handle_event(Event::StreamStart, Direction::Out)
            .unwrap();
    }
}

impl<L: OneTimeLogic> Element for OneTimeSwitch<L> {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        assert!(
            self.state == SwitchState::Active,
            "element `{}` received data after switch-off",
            self.core.id()
        );
        self.run_hook(|logic, ctx| logic.handle_one_time_data(buf, ctx))
    }

    fn handle_event(&mut self, event: Event, direction: Direction) -> GraphResult<()> {
        assert!(
            self.state == SwitchState::Active,
            "element `{}` received {event:?} after switch-off",
            self.core.id()
        );
        match event {
            // Intercepted: the next stage is woken by switch-off, not by
            // the start event rippling through early.
            Event::StreamStart => self.run_hook(|logic, ctx| logic.on_start(ctx)),
            _ => self.core.forward_event(event, direction),
        }
    }
}
