use rdpflow_core::{Buffer, DecodeError, DecodeResult};

/// TPKT header (RFC 1006 / ITU-T T.123): version, reserved byte, and the
/// total packet length in big-endian, header included.
///
/// A TPKT header is of fixed length 4 and the following X.224 TPDU is at
/// least three bytes, so the minimum TPKT length is 7 and the maximum is
/// 65535.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpktHeader {
    pub packet_length: u16,
}

impl TpktHeader {
    pub const VERSION: u8 = 3;

    pub const SIZE: usize = 4;

    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let version = src.read_u8()?;
        if version != Self::VERSION {
            return Err(DecodeError::unsupported_version(version));
        }

        src.skip(1)?; // reserved

        let packet_length = src.read_u16_be()?;
        if usize::from(packet_length) < Self::SIZE + x224_min_tpdu_size() {
            return Err(DecodeError::invalid_field(
                "packetLength",
                "shorter than the framing it must contain",
            ));
        }

        Ok(Self { packet_length })
    }

    pub fn packet_length(self) -> usize {
        usize::from(self.packet_length)
    }
}

const fn x224_min_tpdu_size() -> usize {
    3
}
