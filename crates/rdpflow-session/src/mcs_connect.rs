use rdpflow_core::Buffer;
use rdpflow_graph::{GraphError, GraphResult, OneTimeLogic, SwitchCtx};
use rdpflow_pdu::mcs::{
    AttachUserConfirm, AttachUserRequest, ChannelJoinConfirm, ChannelJoinRequest,
    ErectDomainRequest,
};
use tracing::debug;

use crate::state::SharedConnectionState;
use crate::wire::x224_frame;

/// Erect-domain + attach-user stage: fires both requests back to back,
/// then waits for the attach-user confirm carrying our user channel id.
pub struct McsAttachLogic {
    state: SharedConnectionState,
}

impl McsAttachLogic {
    pub fn new(state: SharedConnectionState) -> Self {
        Self { state }
    }
}

impl OneTimeLogic for McsAttachLogic {
    fn on_start(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let erect = ErectDomainRequest::default();
        debug!(message = ?erect, "Send");
        ctx.send_one_time(x224_frame(&erect)?)?;

        let attach = AttachUserRequest;
        debug!(message = ?attach, "Send");
        ctx.send_one_time(x224_frame(&attach)?)
    }

    fn handle_one_time_data(&mut self, mut buf: Buffer, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let confirm = AttachUserConfirm::decode(&mut buf)?;
        debug!(message = ?confirm, "Received");

        if confirm.result != 0 {
            return Err(GraphError::protocol(
                "AttachUserConfirm",
                format!("server refused the attach: result {}", confirm.result),
            ));
        }

        self.state.lock().expect("connection state").server_user_channel_id =
            Some(confirm.initiator_id);

        ctx.switch_off();
        Ok(())
    }
}

/// Joins the session's channels strictly sequentially: the next join
/// request goes out only once the previous confirm is in, and a confirm
/// for anything but the channel most recently requested is fatal.
pub struct ChannelJoinLogic {
    state: SharedConnectionState,
    static_channels: Vec<u16>,
    remaining: Vec<u16>,
}

impl ChannelJoinLogic {
    pub fn new(state: SharedConnectionState, static_channels: Vec<u16>) -> Self {
        Self {
            state,
            static_channels,
            remaining: Vec::new(),
        }
    }

    fn send_next_join(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let mut state = self.state.lock().expect("connection state");
        let channel_id = match self.remaining.first() {
            Some(&channel) => channel,
            None => {
                state.pending_join = None;
                drop(state);
                ctx.switch_off();
                return Ok(());
            }
        };

        let request = ChannelJoinRequest {
            initiator_id: state.user_channel_id()?,
            channel_id,
        };
        state.pending_join = Some(channel_id);
        drop(state);

        debug!(message = ?request, "Send");
        ctx.send_one_time(x224_frame(&request)?)
    }
}

impl OneTimeLogic for ChannelJoinLogic {
    fn on_start(&mut self, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        {
            let state = self.state.lock().expect("connection state");
            // The user channel must be joined too, first.
            self.remaining = std::iter::once(state.user_channel_id()?)
                .chain(std::iter::once(state.io_channel_id))
                .chain(self.static_channels.iter().copied())
                .collect();
        }
        self.send_next_join(ctx)
    }

    fn handle_one_time_data(&mut self, mut buf: Buffer, ctx: &mut SwitchCtx<'_>) -> GraphResult<()> {
        let confirm = ChannelJoinConfirm::decode(&mut buf)?;
        debug!(message = ?confirm, "Received");

        if confirm.result != 0 {
            return Err(GraphError::protocol(
                "ChannelJoinConfirm",
                format!(
                    "server refused to join channel {}: result {}",
                    confirm.requested_channel_id, confirm.result
                ),
            ));
        }

        let expected = self
            .state
            .lock()
            .expect("connection state")
            .pending_join
            .ok_or_else(|| {
                GraphError::protocol("ChannelJoinConfirm", "confirm without a request in flight")
            })?;

        if confirm.requested_channel_id != expected {
            return Err(GraphError::protocol(
                "ChannelJoinConfirm",
                format!(
                    "out-of-order confirm: requested channel {} while waiting for {}",
                    confirm.requested_channel_id, expected
                ),
            ));
        }
        if confirm.channel_id != expected {
            return Err(GraphError::protocol(
                "ChannelJoinConfirm",
                format!(
                    "channel {} joined as {}; the session cannot continue on a substitute channel",
                    expected, confirm.channel_id
                ),
            ));
        }

        self.remaining.retain(|&channel| channel != expected);
        {
            let mut state = self.state.lock().expect("connection state");
            state.joined_channels.push(expected);
            state.pending_join = None;
        }

        self.send_next_join(ctx)
    }
}
