use rdpflow_core::{
    Buffer, BufferMut, CharacterSet, DecodeError, DecodeResult, Encode, EncodeError, EncodeResult,
};

use crate::tpkt::TpktHeader;

/// Size of the class-0 data TPDU header: length indicator, code, EOT.
pub const DATA_HEADER_SIZE: usize = 3;

pub const TPDU_CODE_DATA: u8 = 0xF0;
pub const TPDU_CODE_CONNECTION_REQUEST: u8 = 0xE0;
pub const TPDU_CODE_CONNECTION_CONFIRM: u8 = 0xD0;

/// End-of-TSDU mark: set on every data TPDU, RDP never fragments at this
/// layer.
pub const EOT: u8 = 0x80;

/// Fixed part of the non-data TPDU headers: LI, code, dst-ref, src-ref,
/// class option.
const CONNECTION_HEADER_SIZE: usize = 7;

/// Validates and consumes an X.224 data TPDU header, leaving the user
/// data in `src`.
pub fn read_data_header(src: &mut Buffer) -> DecodeResult<()> {
    let li = src.read_u8()?;
    if li != 2 {
        return Err(DecodeError::invalid_field(
            "li",
            "data TPDU header length must be 2",
        ));
    }

    let code = src.read_u8()?;
    if code & 0xF0 != TPDU_CODE_DATA {
        return Err(DecodeError::unexpected_message_type(code));
    }

    let options = src.read_u8()?;
    if options & EOT == 0 {
        return Err(DecodeError::invalid_field(
            "options",
            "fragmented TSDUs are not supported",
        ));
    }

    Ok(())
}

/// X.224 class-0 connection request, TPKT included. The optional cookie
/// is the `mstshash` routing token some gateways key sessions on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionRequest {
    pub cookie: Option<String>,
}

impl ConnectionRequest {
    const NAME: &'static str = "X224ConnectionRequest";

    const COOKIE_PREFIX: &'static str = "Cookie: mstshash=";

    fn variable_part_size(&self) -> usize {
        self.cookie
            .as_ref()
            .map(|cookie| Self::COOKIE_PREFIX.len() + cookie.len() + 2)
            .unwrap_or(0)
    }
}

impl Encode for ConnectionRequest {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()> {
        let li = CONNECTION_HEADER_SIZE - 1 + self.variable_part_size();

        dst.write_u8(TpktHeader::VERSION);
        dst.write_padding(1);
        dst.write_u16_be(
            self.size()
                .try_into()
                .map_err(|_| EncodeError::field_overflow("packetLength", "cookie too long"))?,
        );

        dst.write_u8(
            li.try_into()
                .map_err(|_| EncodeError::field_overflow("li", "cookie too long"))?,
        );
        dst.write_u8(TPDU_CODE_CONNECTION_REQUEST);
        dst.write_u16_be(0); // DST-REF
        dst.write_u16_be(0); // SRC-REF
        dst.write_u8(0); // class 0

        if let Some(cookie) = &self.cookie {
            dst.write_string(Self::COOKIE_PREFIX, CharacterSet::Ansi);
            dst.write_string(cookie, CharacterSet::Ansi);
            dst.write_slice(b"\r\n");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        TpktHeader::SIZE + CONNECTION_HEADER_SIZE + self.variable_part_size()
    }
}

/// X.224 class-0 connection confirm, decoded from the TPDU (the TPKT
/// layer is stripped by the de-framing element upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfirm {
    /// Security protocol selected by the server, when it answered with an
    /// RDP negotiation response.
    pub selected_protocol: Option<u32>,
}

impl ConnectionConfirm {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let _li = src.read_u8()?;

        let code = src.read_u8()?;
        if code & 0xF0 != TPDU_CODE_CONNECTION_CONFIRM {
            return Err(DecodeError::unexpected_message_type(code));
        }

        src.skip(5)?; // DST-REF, SRC-REF, class

        // RDP_NEG_RSP: type, flags, length, selected protocol.
        let selected_protocol = if src.remaining() >= 8 && src.peek_u8()? == 0x02 {
            src.skip(2)?;
            let length = src.read_u16()?;
            if length != 8 {
                return Err(DecodeError::invalid_field(
                    "negotiationResponse",
                    "unexpected length",
                ));
            }
            Some(src.read_u32()?)
        } else {
            None
        };

        Ok(Self { selected_protocol })
    }
}
