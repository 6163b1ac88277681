use std::sync::Arc;

use rdpflow_core::{encode_to_buffer, Buffer};
use rdpflow_graph::{GraphResult, OneTimeLogic, SocketStreamHandle, SwitchCtx};
use rdpflow_pdu::x224::{ConnectionConfirm, ConnectionRequest};
use tracing::debug;

use crate::ConnectionConfig;

/// First handshake stage: sends the X.224 connection request, parses the
/// confirm, and upgrades the transport to TLS when configured before any
/// MCS traffic flows.
pub struct X224ConnectLogic {
    cookie: Option<String>,
    server_name: String,
    tls: Option<Arc<rustls::ClientConfig>>,
    stream: Arc<SocketStreamHandle>,
}

impl X224ConnectLogic {
    pub fn new(config: &ConnectionConfig, stream: Arc<SocketStreamHandle>) -> Self {
        Self {
            cookie: Some(config.username.clone()),
            server_name: config.server_name.clone(),
            tls: config.tls.clone(),
            stream,
        }
    }
}

impl OneTimeLogic for X224ConnectLogic {
    fn on_start(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let request = ConnectionRequest {
            cookie: self.cookie.clone(),
        };
        debug!(message = ?request, "Send");
        ctx.send_one_time(encode_to_buffer(&request)?)
    }

    fn handle_one_time_data(&mut self, mut buf: Buffer, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let confirm = ConnectionConfirm::decode(&mut buf)?;
        debug!(message = ?confirm, "Received");

        if let Some(tls) = &self.tls {
            // Runs on the inbound thread, between protocol messages: the
            // socket is quiet until our next request goes out.
            self.stream.upgrade_to_tls(Arc::clone(tls), &self.server_name)?;
        }

        ctx.switch_off();
        Ok(())
    }
}
