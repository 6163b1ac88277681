use rdpflow_core::{Buffer, BufferMut, DecodeError, DecodeResult, Encode, EncodeResult};

const SYNC_MESSAGE_TYPE: u16 = 1;

/// TS_SYNCHRONIZE_PDU: message type `SYNCMSGTYPE_SYNC` plus the MCS
/// channel id of the target user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynchronizePdu {
    pub target_user_id: u16,
}

impl SynchronizePdu {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let message_type = src.read_u16()?;
        if message_type != SYNC_MESSAGE_TYPE {
            return Err(DecodeError::invalid_field(
                "messageType",
                "synchronize PDU with a non-sync message type",
            ));
        }
        let target_user_id = src.read_u16()?;
        Ok(Self { target_user_id })
    }
}

impl Encode for SynchronizePdu {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        dst.write_u16(SYNC_MESSAGE_TYPE);
        dst.write_u16(self.target_user_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SynchronizePdu"
    }

    fn size(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdpflow_core::encode_to_buffer;

    #[test]
    fn synchronize_round_trip() {
        let pdu = SynchronizePdu { target_user_id: 1002 };
        let mut encoded = encode_to_buffer(&pdu).unwrap();
        assert_eq!(encoded.as_slice(), &[0x01, 0x00, 0xea, 0x03]);
        assert_eq!(SynchronizePdu::decode(&mut encoded).unwrap(), pdu);
    }
}
