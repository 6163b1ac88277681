use std::net::TcpStream;
use std::thread::JoinHandle;

use rdpflow_graph::{
    element_ref, link_elements, ElementRef, GraphResult, OneTimeSwitch, Pipeline, SocketWrapper,
    DEFAULT_SINK_PAD, ONE_TIME_PAD,
};
use tracing::{debug, warn};

use crate::activation::{ClientInfoLogic, DemandActiveLogic, SynchronizeLogic};
use crate::connect::X224ConnectLogic;
use crate::framing::{TpktFramer, X224DataFramer};
use crate::mcs_connect::{ChannelJoinLogic, McsAttachLogic};
use crate::router::{ServerIoChannelRouter, BITMAP_PAD, ORDERS_PAD, PALETTE_PAD};
use crate::state::{ConnectionState, SharedConnectionState};
use crate::{ConnectionConfig, SharedScreen, DEFAULT_IO_CHANNEL_ID};

/// The assembled protocol engine for one connection: socket adapter,
/// de-framing chain, handshake row and steady-state router.
pub struct RdpClient {
    pipeline: Pipeline,
    wrapper: SocketWrapper,
    state: SharedConnectionState,
    outbound: Option<JoinHandle<GraphResult<()>>>,
}

impl RdpClient {
    /// Builds the connection graph over an established TCP stream. The
    /// handshake does not start until [`run`](RdpClient::run).
    pub fn new(
        stream: TcpStream,
        config: ConnectionConfig,
        screen: SharedScreen,
    ) -> GraphResult<Self> {
        let state = ConnectionState::new(DEFAULT_IO_CHANNEL_ID);
        let wrapper = SocketWrapper::new("tcp", stream)?;
        let mut pipeline = Pipeline::new("rdp-client");

        pipeline.add(ElementRef::clone(wrapper.source()));
        pipeline.add(ElementRef::clone(wrapper.sink()));
        pipeline.add(element_ref(TpktFramer::new("tpkt")));
        pipeline.add(element_ref(OneTimeSwitch::new(
            "x224-connect",
            X224ConnectLogic::new(&config, wrapper.stream()),
        )));
        pipeline.add(element_ref(X224DataFramer::new("x224-data")));
        pipeline.add(element_ref(OneTimeSwitch::new(
            "mcs-attach",
            McsAttachLogic::new(SharedConnectionState::clone(&state)),
        )));
        pipeline.add(element_ref(OneTimeSwitch::new(
            "channel-join",
            ChannelJoinLogic::new(
                SharedConnectionState::clone(&state),
                config.static_channels.clone(),
            ),
        )));
        pipeline.add(element_ref(OneTimeSwitch::new(
            "client-info",
            ClientInfoLogic::new(SharedConnectionState::clone(&state), config),
        )));
        pipeline.add(element_ref(OneTimeSwitch::new(
            "demand-active",
            DemandActiveLogic::new(SharedConnectionState::clone(&state), screen),
        )));
        pipeline.add(element_ref(OneTimeSwitch::new(
            "synchronize",
            SynchronizeLogic::new(SharedConnectionState::clone(&state)),
        )));
        pipeline.add(element_ref(ServerIoChannelRouter::new(
            "router",
            SharedConnectionState::clone(&state),
        )));

        pipeline.link(&[
            "tcp-src",
            "tpkt",
            "x224-connect",
            "x224-data",
            "mcs-attach",
            "channel-join",
            "client-info",
            "demand-active",
            "synchronize",
            "router",
        ])?;

        // Each handshake element fires its one-shot requests straight at
        // the socket sink through its dedicated one-time pad.
        for element in [
            "x224-connect",
            "mcs-attach",
            "channel-join",
            "client-info",
            "demand-active",
            "synchronize",
        ] {
            let switch = pipeline
                .get(element)
                .map(ElementRef::clone)
                .ok_or_else(|| rdpflow_graph::GraphError::UnknownElement(element.to_owned()))?;
            link_elements(
                format!("{element}:tcp-sink"),
                &switch,
                ONE_TIME_PAD,
                wrapper.sink(),
                element,
            );
        }

        // Outer interface for client→server traffic (input events, etc.)
        // supplied by the embedder.
        pipeline.link(&["IN", "stdin< tcp-sink"])?;

        Ok(Self {
            pipeline,
            wrapper,
            state,
            outbound: None,
        })
    }

    /// The steady-state dispatcher; wire its `orders`/`bitmap`/`palette`
    /// pads to the renderer before calling [`run`](RdpClient::run).
    pub fn router(&self) -> &ElementRef {
        self.pipeline.get("router").expect("router element")
    }

    /// Convenience wiring of the three renderer pads.
    pub fn attach_renderer(
        &self,
        orders: &ElementRef,
        bitmap: &ElementRef,
        palette: &ElementRef,
    ) {
        let router = self.router();
        link_elements("router:orders", router, ORDERS_PAD, orders, DEFAULT_SINK_PAD);
        link_elements("router:bitmap", router, BITMAP_PAD, bitmap, DEFAULT_SINK_PAD);
        link_elements("router:palette", router, PALETTE_PAD, palette, DEFAULT_SINK_PAD);
    }

    pub fn state(&self) -> &SharedConnectionState {
        &self.state
    }

    /// Kicks off the handshake and drives the inbound direction on the
    /// calling thread until the connection ends. The outbound direction
    /// runs its pull loop on a dedicated thread.
    pub fn run(&mut self) -> GraphResult<()> {
        self.pipeline.validate()?;

        self.outbound = self
            .pipeline
            .run_main_loop("tcp-sink", DEFAULT_SINK_PAD, true, false)?;

        debug!("starting RDP connection sequence");
        self.pipeline.start("x224-connect")?;

        let result = self.wrapper.run_inbound();
        if let Err(error) = &result {
            warn!(%error, "connection failed, tearing down");
        }
        self.shutdown();
        result
    }

    /// Tears the graph down and closes the transport. Idempotent.
    pub fn shutdown(&mut self) {
        self.pipeline.shutdown();
        self.wrapper.stream().shutdown();
        if let Some(handle) = self.outbound.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(%error, "outbound loop ended with an error"),
                Err(_) => warn!("outbound loop panicked"),
            }
        }
    }
}
