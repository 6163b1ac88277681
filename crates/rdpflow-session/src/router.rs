use num_traits::FromPrimitive as _;
use rdpflow_core::Buffer;
use rdpflow_graph::{
    Element, ElementCore, GraphError, GraphResult, LinkRef, DEFAULT_SINK_PAD,
};
use rdpflow_pdu::mcs::SendDataIndication;
use rdpflow_pdu::rdp::headers::{
    ShareControlHeader, ShareControlPduType, ShareDataHeader, ShareDataPduType, UpdateType,
};
use tracing::{debug, trace, warn};

use crate::state::SharedConnectionState;

/// Output pad carrying drawing-order update payloads.
pub const ORDERS_PAD: &str = "orders";
/// Output pad carrying bitmap update payloads.
pub const BITMAP_PAD: &str = "bitmap";
/// Output pad carrying palette update payloads.
pub const PALETTE_PAD: &str = "palette";

/// Steady-state dispatcher for the I/O channel: demultiplexes the MCS
/// send-data indications by share control PDU type and, for data PDUs,
/// by the inner PDU type, forwarding update payloads to the renderer
/// pads and discarding types this client does not act on.
pub struct ServerIoChannelRouter {
    core: ElementCore,
    state: SharedConnectionState,
}

impl ServerIoChannelRouter {
    pub fn new(id: impl Into<String>, state: SharedConnectionState) -> Self {
        Self {
            core: ElementCore::new(id)
                .require_pads(&[DEFAULT_SINK_PAD], &[ORDERS_PAD, BITMAP_PAD, PALETTE_PAD]),
            state,
        }
    }

    fn route_data_pdu(&mut self, mut body: Buffer) -> GraphResult<()> {
        let header = ShareDataHeader::decode(&mut body)?;
        match header.pdu_type2 {
            ShareDataPduType::Update => {
                let update_type = body.read_u16()?;
                let mut payload = body.read_remaining();
                payload.set_order(u32::from(update_type));
                match UpdateType::from_u16(update_type) {
                    Some(UpdateType::Orders) => self.core.send_out(ORDERS_PAD, payload),
                    Some(UpdateType::Bitmap) => self.core.send_out(BITMAP_PAD, payload),
                    Some(UpdateType::Palette) => self.core.send_out(PALETTE_PAD, payload),
                    Some(UpdateType::Synchronize) => Ok(()),
                    None => Err(GraphError::protocol(
                        "ServerIoChannelRouter",
                        format!("unknown update type {update_type:#06x}"),
                    )),
                }
            }
            ShareDataPduType::SetErrorInfo => {
                let error_info = body.read_u32()?;
                warn!(error_info, "server reported an error info code");
                Ok(())
            }
            other => {
                trace!(pdu_type2 = ?other, "ignoring data PDU this client does not act on");
                Ok(())
            }
        }
    }
}

impl Element for ServerIoChannelRouter {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ElementCore {
        &mut self.core
    }

    fn handle_data(&mut self, mut buf: Buffer, _link: &LinkRef) -> GraphResult<()> {
        let indication = SendDataIndication::decode(&mut buf)?;

        let io_channel_id = self.state.lock().expect("connection state").io_channel_id;
        if indication.channel_id != io_channel_id {
            trace!(
                channel = indication.channel_id,
                "ignoring PDU for a channel without a consumer"
            );
            return Ok(());
        }

        let mut user_data = indication.user_data;
        let header = ShareControlHeader::decode(&mut user_data)?;

        match header.pdu_type {
            ShareControlPduType::Data => {
                let share_id = self.state.lock().expect("connection state").share_id()?;
                if header.share_id != share_id {
                    return Err(GraphError::protocol(
                        "ServerIoChannelRouter",
                        format!(
                            "data PDU for share {:#010x}, session negotiated {:#010x}",
                            header.share_id, share_id
                        ),
                    ));
                }
                self.route_data_pdu(user_data)
            }
            ShareControlPduType::DeactivateAll => {
                debug!("server deactivated the session");
                Ok(())
            }
            ShareControlPduType::DemandActive => Err(GraphError::protocol(
                "ServerIoChannelRouter",
                "re-activation sequences are not supported",
            )),
            ShareControlPduType::ConfirmActive => Err(GraphError::protocol(
                "ServerIoChannelRouter",
                "confirm-active is a client-to-server PDU",
            )),
            ShareControlPduType::ServerRedirect => Err(GraphError::protocol(
                "ServerIoChannelRouter",
                "server redirection is not supported",
            )),
        }
    }
}
