use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use rdpflow_core::{Buffer, BufferMut, DecodeError, DecodeResult, EncodeError, EncodeResult};

/// Version bits carried in the high nibble of every share control PDU
/// type field.
const PROTOCOL_VERSION: u16 = 0x10;
const SHARE_CONTROL_TYPE_MASK: u16 = 0xF;

pub const BASIC_SECURITY_HEADER_SIZE: usize = 4;
/// Length, type/version, source, share id.
pub const SHARE_CONTROL_HEADER_SIZE: usize = 10;
/// Padding, stream id, uncompressed length, type2, compression type,
/// compressed length.
pub const SHARE_DATA_HEADER_SIZE: usize = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BasicSecurityHeaderFlags: u16 {
        const EXCHANGE_PKT = 0x0001;
        const ENCRYPT = 0x0008;
        const RESET_SEQNO = 0x0010;
        const IGNORE_SEQNO = 0x0020;
        const INFO_PKT = 0x0040;
        const LICENSE_PKT = 0x0080;
        const REDIRECTION_PKT = 0x0400;
        const SECURE_CHECKSUM = 0x0800;
        const FLAGSHI_VALID = 0x8000;
    }
}

/// TS_SECURITY_HEADER: flags plus an unused high word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicSecurityHeader {
    pub flags: BasicSecurityHeaderFlags,
}

impl BasicSecurityHeader {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let flags = BasicSecurityHeaderFlags::from_bits(src.read_u16()?).ok_or(
            DecodeError::InvalidField {
                field: "securityFlags",
                reason: "unknown flag bits",
            },
        )?;
        src.skip(2)?; // flagsHi
        Ok(Self { flags })
    }

    pub fn encode(self, dst: &mut BufferMut) {
        dst.write_u16(self.flags.bits());
        dst.write_u16(0); // flagsHi
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ShareControlPduType {
    DemandActive = 0x1,
    ConfirmActive = 0x3,
    DeactivateAll = 0x6,
    Data = 0x7,
    ServerRedirect = 0xa,
}

/// TS_SHARECONTROLHEADER plus the share id every body starts with. The
/// PDU body stays in the source buffer for the caller to dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareControlHeader {
    pub total_length: u16,
    pub pdu_type: ShareControlPduType,
    pub pdu_source: u16,
    pub share_id: u32,
}

impl ShareControlHeader {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        let total_length = src.read_u16()?;
        let type_with_version = src.read_u16()?;
        let pdu_source = src.read_u16()?;
        let share_id = src.read_u32()?;

        let pdu_type = ShareControlPduType::from_u16(type_with_version & SHARE_CONTROL_TYPE_MASK)
            .ok_or_else(|| {
                DecodeError::invalid_field("pduType", "unknown share control PDU type")
            })?;
        if type_with_version & !SHARE_CONTROL_TYPE_MASK != PROTOCOL_VERSION {
            return Err(DecodeError::invalid_field("pduVersion", "unknown version bits"));
        }

        Ok(Self {
            total_length,
            pdu_type,
            pdu_source,
            share_id,
        })
    }
}

/// Writes a share control header for a body of `body_size` bytes.
pub fn write_share_control_header(
    dst: &mut BufferMut,
    pdu_type: ShareControlPduType,
    pdu_source: u16,
    share_id: u32,
    body_size: usize,
) -> EncodeResult<()> {
    let total: u16 = (SHARE_CONTROL_HEADER_SIZE + body_size)
        .try_into()
        .map_err(|_| EncodeError::field_overflow("totalLength", "body exceeds a share PDU"))?;
    dst.write_u16(total);
    dst.write_u16(PROTOCOL_VERSION | pdu_type.to_u16().unwrap_or_default());
    dst.write_u16(pdu_source);
    dst.write_u32(share_id);
    Ok(())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum StreamId {
    Undefined = 0,
    Low = 1,
    Medium = 2,
    High = 4,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ShareDataPduType {
    Update = 0x02,
    Control = 0x14,
    Pointer = 0x1b,
    Input = 0x1c,
    Synchronize = 0x1f,
    RefreshRectangle = 0x21,
    PlaySound = 0x22,
    SuppressOutput = 0x23,
    ShutdownRequest = 0x24,
    ShutdownDenied = 0x25,
    SaveSessionInfo = 0x26,
    FontList = 0x27,
    FontMap = 0x28,
    SetKeyboardIndicators = 0x29,
    BitmapCachePersistentList = 0x2b,
    BitmapCacheError = 0x2c,
    SetKeyboardImeStatus = 0x2d,
    OffscreenCacheError = 0x2e,
    SetErrorInfo = 0x2f,
    ArcStatus = 0x32,
    StatusInfo = 0x36,
    MonitorLayout = 0x37,
    FrameAcknowledge = 0x38,
}

/// TS_SHAREDATAHEADER minus the share id (consumed with the control
/// header). The inner PDU stays in the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareDataHeader {
    pub stream_id: StreamId,
    pub uncompressed_length: u16,
    pub pdu_type2: ShareDataPduType,
}

impl ShareDataHeader {
    pub fn decode(src: &mut Buffer) -> DecodeResult<Self> {
        src.skip(1)?; // padding
        let stream_id = StreamId::from_u8(src.read_u8()?)
            .ok_or_else(|| DecodeError::invalid_field("streamId", "unknown stream id"))?;
        let uncompressed_length = src.read_u16()?;
        let pdu_type2 = ShareDataPduType::from_u8(src.read_u8()?)
            .ok_or_else(|| DecodeError::invalid_field("pduType2", "unknown share data PDU type"))?;
        let compression = src.read_u8()?;
        if compression & 0x20 != 0 {
            return Err(DecodeError::invalid_field(
                "compressionFlags",
                "compressed share data is not supported",
            ));
        }
        src.skip(2)?; // compressed length

        Ok(Self {
            stream_id,
            uncompressed_length,
            pdu_type2,
        })
    }
}

/// Writes a share data header for an inner PDU of `body_size` bytes.
pub fn write_share_data_header(
    dst: &mut BufferMut,
    stream_id: StreamId,
    pdu_type2: ShareDataPduType,
    body_size: usize,
) -> EncodeResult<()> {
    // The advertised uncompressed length covers the body plus the type
    // and compression fields.
    let uncompressed: u16 = (body_size + 4)
        .try_into()
        .map_err(|_| EncodeError::field_overflow("uncompressedLength", "body exceeds a share PDU"))?;
    dst.write_padding(1);
    dst.write_u8(stream_id.to_u8().unwrap_or_default());
    dst.write_u16(uncompressed);
    dst.write_u8(pdu_type2.to_u8().unwrap_or_default());
    dst.write_u8(0); // compression type
    dst.write_u16(0); // compressed length
    Ok(())
}

/// Update kind carried in the first 16 bits of an Update data PDU.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum UpdateType {
    Orders = 0,
    Bitmap = 1,
    Palette = 2,
    Synchronize = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_control_header_round_trip() {
        let mut dst = BufferMut::with_capacity(SHARE_CONTROL_HEADER_SIZE);
        write_share_control_header(&mut dst, ShareControlPduType::Data, 1002, 0x0001_000e, 32)
            .unwrap();
        let mut src = dst.freeze();

        let header = ShareControlHeader::decode(&mut src).unwrap();
        assert_eq!(header.total_length, 42);
        assert_eq!(header.pdu_type, ShareControlPduType::Data);
        assert_eq!(header.pdu_source, 1002);
        assert_eq!(header.share_id, 0x0001_000e);
    }

    #[test]
    fn share_data_header_round_trip() {
        let mut dst = BufferMut::with_capacity(SHARE_DATA_HEADER_SIZE);
        write_share_data_header(&mut dst, StreamId::Low, ShareDataPduType::Synchronize, 8).unwrap();
        let mut src = dst.freeze();

        let header = ShareDataHeader::decode(&mut src).unwrap();
        assert_eq!(header.stream_id, StreamId::Low);
        assert_eq!(header.pdu_type2, ShareDataPduType::Synchronize);
        assert_eq!(header.uncompressed_length, 12);
    }

    #[test]
    fn rejects_compressed_share_data() {
        let mut src = Buffer::from_static(&[0, 1, 12, 0, 0x1f, 0x20, 0, 0]);
        assert!(ShareDataHeader::decode(&mut src).is_err());
    }
}
