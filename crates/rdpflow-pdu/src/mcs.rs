//! T.125 MCS domain PDUs, PER-encoded.
//!
//! Only the subset the connection sequence needs is modeled: erect
//! domain, attach user, channel join, and the send-data envelope that
//! carries all steady-state traffic. Client→server PDUs encode their MCS
//! body only; the X224/TPKT layers are applied by [`crate::frame`].

use rdpflow_core::{
    Buffer, BufferMut, DecodeError, DecodeResult, Encode, EncodeResult,
};

use crate::per;

/// User and channel ids handed out by MCS start here; the wire carries
/// user ids as an offset from this base.
pub(crate) const MCS_BASE_USER_ID: u16 = 1001;

/// High priority, begin|end segmentation: every PDU travels whole.
pub(crate) const SEND_DATA_PRIORITY_AND_SEGMENTATION: u8 = 0x70;

const RESULT_ENUM_LENGTH: u8 = 16;

/// Domain MCS PDU selector, carried in the top six bits of the first
/// body byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum DomainPdu {
    ErectDomainRequest = 1,
    AttachUserRequest = 10,
    AttachUserConfirm = 11,
    ChannelJoinRequest = 14,
    ChannelJoinConfirm = 15,
    SendDataRequest = 25,
    SendDataIndication = 26,
}

impl DomainPdu {
    pub(crate) fn to_choice(self) -> u8 {
        (self as u8) << 2
    }

    fn from_choice(choice: u8) -> Option<Self> {
        match choice >> 2 {
            1 => Some(Self::ErectDomainRequest),
            10 => Some(Self::AttachUserRequest),
            11 => Some(Self::AttachUserConfirm),
            14 => Some(Self::ChannelJoinRequest),
            15 => Some(Self::ChannelJoinConfirm),
            25 => Some(Self::SendDataRequest),
            26 => Some(Self::SendDataIndication),
            _ => None,
        }
    }
}

fn read_domain_pdu_header(src: &mut Buffer, expected: DomainPdu) -> DecodeResult<()> {
    let choice = src.read_u8()?;
    match DomainPdu::from_choice(choice) {
        Some(pdu) if pdu == expected => Ok(()),
        _ => Err(DecodeError::unexpected_message_type(choice)),
    }
}

/// ErectDomainRequest: both parameters are PER length-prefixed integers,
/// zero for an RDP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErectDomainRequest {
    pub sub_height: u32,
    pub sub_interval: u32,
}

impl Encode for ErectDomainRequest {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        dst.write_u8(DomainPdu::ErectDomainRequest.to_choice());
        write_per_u32(dst, self.sub_height);
        write_per_u32(dst, self.sub_interval);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ErectDomainRequest"
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + sizeof_per_u32(self.sub_height) + sizeof_per_u32(self.sub_interval)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachUserRequest;

impl Encode for AttachUserRequest {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        dst.write_u8(DomainPdu::AttachUserRequest.to_choice());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "AttachUserRequest"
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE
    }
}

/// AttachUserConfirm: result enum plus the initiator (the user channel id
/// the server assigned us).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachUserConfirm {
    pub result: u8,
    pub initiator_id: u16,
}

impl AttachUserConfirm {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let choice = src.peek_u8()?;
        read_domain_pdu_header(src, DomainPdu::AttachUserConfirm)?;

        if choice & 0x02 == 0 {
            return Err(DecodeError::invalid_field(
                "initiator",
                "attach-user confirm without an initiator",
            ));
        }

        let result = per::read_enum(src, RESULT_ENUM_LENGTH)?;
        let initiator_id = per::read_u16(src, MCS_BASE_USER_ID)?;

        Ok(Self { result, initiator_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelJoinRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
}

impl Encode for ChannelJoinRequest {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        dst.write_u8(DomainPdu::ChannelJoinRequest.to_choice());
        per::write_u16(dst, self.initiator_id, MCS_BASE_USER_ID)?;
        per::write_u16(dst, self.channel_id, 0)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ChannelJoinRequest"
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::U16_SIZE * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelJoinConfirm {
    pub result: u8,
    pub initiator_id: u16,
    pub requested_channel_id: u16,
    /// Must equal the requested channel, or the connection is invalid.
    pub channel_id: u16,
}

impl ChannelJoinConfirm {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        read_domain_pdu_header(src, DomainPdu::ChannelJoinConfirm)?;

        let result = per::read_enum(src, RESULT_ENUM_LENGTH)?;
        let initiator_id = per::read_u16(src, MCS_BASE_USER_ID)?;
        let requested_channel_id = per::read_u16(src, 0)?;
        let channel_id = per::read_u16(src, 0)?;

        Ok(Self {
            result,
            initiator_id,
            requested_channel_id,
            channel_id,
        })
    }
}

/// Send-data indication: the server→client envelope carrying all
/// post-handshake traffic. The user data stays a zero-copy sub-buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataIndication {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Buffer,
}

impl SendDataIndication {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        read_domain_pdu_header(src, DomainPdu::SendDataIndication)?;

        let initiator_id = per::read_u16(src, MCS_BASE_USER_ID)?;
        let channel_id = per::read_u16(src, 0)?;
        src.skip(1)?; // data priority + segmentation

        let length = per::read_length(src)?;
        let user_data = src.read_slice(usize::from(length))?;

        Ok(Self {
            initiator_id,
            channel_id,
            user_data,
        })
    }
}

/// Is the next MCS body byte a send-data indication?
pub fn peeks_send_data_indication(src: &Buffer) -> DecodeResult<bool> {
    Ok(DomainPdu::from_choice(src.peek_u8()?) == Some(DomainPdu::SendDataIndication))
}

fn write_per_u32(dst: &mut BufferMut, value: u32) {
    if value <= 0xff {
        per::write_length(dst, 1);
        dst.write_u8(value.to_le_bytes()[0]);
    } else if let Ok(short) = u16::try_from(value) {
        per::write_length(dst, 2);
        dst.write_u16_be(short);
    } else {
        per::write_length(dst, 4);
        dst.write_u32_be(value);
    }
}

fn sizeof_per_u32(value: u32) -> usize {
    if value <= 0xff {
        2
    } else if value <= 0xffff {
        3
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdpflow_core::encode_to_buffer;

    #[test]
    fn attach_user_confirm_reference_bytes() {
        let mut src = Buffer::from_static(&[0x2e, 0x00, 0x00, 0x03]);
        let confirm = AttachUserConfirm::decode(&mut src).unwrap();
        assert_eq!(confirm.result, 0);
        assert_eq!(confirm.initiator_id, 1004);
    }

    #[test]
    fn channel_join_request_reference_bytes() {
        let request = ChannelJoinRequest {
            initiator_id: 1004,
            channel_id: 1003,
        };
        let encoded = encode_to_buffer(&request).unwrap();
        assert_eq!(encoded.as_slice(), &[0x38, 0x00, 0x03, 0x03, 0xeb]);
    }

    #[test]
    fn channel_join_confirm_round_fields() {
        let mut src = Buffer::from_static(&[0x3e, 0x00, 0x00, 0x03, 0x03, 0xeb, 0x03, 0xeb]);
        let confirm = ChannelJoinConfirm::decode(&mut src).unwrap();
        assert_eq!(confirm.result, 0);
        assert_eq!(confirm.initiator_id, 1004);
        assert_eq!(confirm.requested_channel_id, 1003);
        assert_eq!(confirm.channel_id, 1003);
    }

    #[test]
    fn send_data_indication_extracts_zero_copy_payload() {
        let mut src = Buffer::from_static(&[
            0x68, // send-data indication
            0x00, 0x03, // initiator 1004
            0x03, 0xeb, // channel 1003
            0x70, // priority + segmentation
            0x03, // length
            0xaa, 0xbb, 0xcc,
        ]);
        let indication = SendDataIndication::decode(&mut src).unwrap();
        assert_eq!(indication.channel_id, 1003);
        assert_eq!(indication.user_data.as_slice(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(src.remaining(), 0);
    }

    #[test]
    fn erect_domain_request_minimal_form() {
        let encoded = encode_to_buffer(&ErectDomainRequest::default()).unwrap();
        assert_eq!(encoded.as_slice(), &[0x04, 0x01, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn rejects_wrong_domain_pdu() {
        let mut src = Buffer::from_static(&[0x28, 0x00, 0x00, 0x03]);
        assert!(matches!(
            AttachUserConfirm::decode(&mut src),
            Err(DecodeError::UnexpectedMessageType { .. })
        ));
    }
}
