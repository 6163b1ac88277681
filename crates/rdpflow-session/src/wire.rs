//! Framing helpers shared by the handshake elements.

use rdpflow_core::{Buffer, BufferMut, Encode};
use rdpflow_graph::GraphResult;
use rdpflow_pdu::frame;

/// Encodes a bare MCS domain PDU and wraps it in X224 + TPKT.
pub(crate) fn x224_frame(pdu: &impl Encode) -> GraphResult<Buffer> {
    let mut buf = BufferMut::with_header_room(frame::HEADER_ROOM, pdu.size());
    pdu.encode(&mut buf)?;
    frame::wrap_in_x224(&mut buf)?;
    Ok(buf.freeze())
}

/// Starts a send-data request body with room for all framing layers.
pub(crate) fn send_data_body(capacity: usize) -> BufferMut {
    BufferMut::with_header_room(frame::HEADER_ROOM, capacity)
}

/// Wraps an assembled body in MCS send-data request + X224 + TPKT.
pub(crate) fn send_data_frame(
    mut body: BufferMut,
    initiator_id: u16,
    channel_id: u16,
) -> GraphResult<Buffer> {
    frame::wrap_in_send_data_request(&mut body, initiator_id, channel_id)?;
    Ok(body.freeze())
}
