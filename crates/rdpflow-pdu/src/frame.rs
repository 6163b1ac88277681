//! Outside-in framing over already-encoded payloads.
//!
//! Client→server PDUs are built innermost-first into a [`BufferMut`] with
//! reserved header room, then wrapped here: each layer prepends its header
//! with the exact length of everything inside it, so no payload bytes are
//! ever copied.

use rdpflow_core::{BufferMut, EncodeError, EncodeResult};

use crate::mcs::{MCS_BASE_USER_ID, SEND_DATA_PRIORITY_AND_SEGMENTATION};
use crate::tpkt::TpktHeader;
use crate::x224;

/// Header room covering TPKT + X224 data TPDU + the largest MCS send-data
/// request header.
pub const HEADER_ROOM: usize = TpktHeader::SIZE + x224::DATA_HEADER_SIZE + 8;

/// Prepends an X.224 data TPDU header and a TPKT header sized to the
/// current contents.
pub fn wrap_in_x224(buf: &mut BufferMut) -> EncodeResult<()> {
    buf.prepend_slice(&[2, x224::TPDU_CODE_DATA, x224::EOT]);

    let total: u16 = (buf.len() + TpktHeader::SIZE)
        .try_into()
        .map_err(|_| EncodeError::field_overflow("packetLength", "payload exceeds a TPKT"))?;
    let length = total.to_be_bytes();
    buf.prepend_slice(&[TpktHeader::VERSION, 0, length[0], length[1]]);
    Ok(())
}

/// Prepends an MCS send-data request header (initiator carried as an
/// offset from 1001, high priority, begin|end segmentation), then the
/// X224 and TPKT layers.
pub fn wrap_in_send_data_request(
    buf: &mut BufferMut,
    initiator_id: u16,
    channel_id: u16,
) -> EncodeResult<()> {
    let data_length: u16 = buf
        .len()
        .try_into()
        .map_err(|_| EncodeError::field_overflow("userDataLength", "payload exceeds a TPKT"))?;

    let initiator_offset = initiator_id
        .checked_sub(MCS_BASE_USER_ID)
        .ok_or_else(|| EncodeError::invalid_field("initiator", "user id below 1001"))?;

    let mut header = [0u8; 8];
    let mut used = 0;
    let mut push = |byte: u8| {
        header[used] = byte;
        used += 1;
    };

    push(crate::mcs::DomainPdu::SendDataRequest.to_choice());
    let initiator = initiator_offset.to_be_bytes();
    push(initiator[0]);
    push(initiator[1]);
    let channel = channel_id.to_be_bytes();
    push(channel[0]);
    push(channel[1]);
    push(SEND_DATA_PRIORITY_AND_SEGMENTATION);
    if data_length > 0x7f {
        let length = (data_length | 0x8000).to_be_bytes();
        push(length[0]);
        push(length[1]);
    } else {
        push(data_length.to_le_bytes()[0]);
    }

    buf.prepend_slice(&header[..used]);
    wrap_in_x224(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_data_request_framing_is_byte_exact() {
        let mut buf = BufferMut::with_header_room(HEADER_ROOM, 4);
        buf.write_slice(&[0xde, 0xad, 0xbe, 0xef]);
        wrap_in_send_data_request(&mut buf, 1004, 1003).unwrap();

        assert_eq!(
            buf.freeze().as_slice(),
            &[
                0x03, 0x00, 0x00, 0x12, // TPKT, length 18
                0x02, 0xf0, 0x80, // X224 data TPDU
                0x64, // send-data request
                0x00, 0x03, // initiator 1004 - 1001
                0x03, 0xeb, // channel 1003
                0x70, // high priority, begin|end
                0x04, // user data length
                0xde, 0xad, 0xbe, 0xef,
            ]
        );
    }

    #[test]
    fn long_payload_uses_two_byte_per_length() {
        let mut buf = BufferMut::with_header_room(HEADER_ROOM, 0x90);
        buf.write_padding(0x90);
        wrap_in_send_data_request(&mut buf, 1004, 1003).unwrap();

        let frozen = buf.freeze();
        // 0x90 bytes of payload need the 0x8000-marked two-byte length.
        assert_eq!(&frozen.as_slice()[13..15], &[0x80, 0x90]);
        assert_eq!(frozen.len(), 4 + 3 + 8 + 0x90);
    }
}
