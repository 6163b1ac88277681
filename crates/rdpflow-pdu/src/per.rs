//! The handful of ASN.1 PER primitives the MCS layer needs.

use rdpflow_core::{Buffer, BufferMut, DecodeError, DecodeResult, EncodeError, EncodeResult};

pub(crate) const CHOICE_SIZE: usize = 1;
pub(crate) const ENUM_SIZE: usize = 1;
pub(crate) const U16_SIZE: usize = 2;

/// PER length determinant: a set top bit in the first byte selects a
/// two-byte field carrying the length in the low 15 bits.
pub(crate) fn read_length(src: &mut Buffer) -> DecodeResult<u16> {
    let first = src.read_u8()?;
    if first & 0x80 != 0 {
        let second = src.read_u8()?;
        Ok((u16::from(first & 0x7f) << 8) | u16::from(second))
    } else {
        Ok(u16::from(first))
    }
}

pub(crate) fn write_length(dst: &mut BufferMut, length: u16) {
    if length > 0x7f {
        dst.write_u16_be(length | 0x8000);
    } else {
        dst.write_u8(length.to_le_bytes()[0]);
    }
}

pub(crate) fn sizeof_length(length: u16) -> usize {
    if length > 0x7f {
        2
    } else {
        1
    }
}

/// Constrained u16 with a lower bound; the wire carries the offset from
/// `min` (user ids are carried as an offset from 1001).
pub(crate) fn read_u16(src: &mut Buffer, min: u16) -> DecodeResult<u16> {
    let value = src.read_u16_be()?;
    min.checked_add(value)
        .ok_or(DecodeError::InvalidField {
            field: "PER u16",
            reason: "constrained value overflows",
        })
}

pub(crate) fn write_u16(dst: &mut BufferMut, value: u16, min: u16) -> EncodeResult<()> {
    let offset = value
        .checked_sub(min)
        .ok_or_else(|| EncodeError::invalid_field("PER u16", "value below constraint minimum"))?;
    dst.write_u16_be(offset);
    Ok(())
}

pub(crate) fn read_enum(src: &mut Buffer, count: u8) -> DecodeResult<u8> {
    let enumerated = src.read_u8()?;
    if enumerated >= count {
        Err(DecodeError::InvalidField {
            field: "PER enum",
            reason: "enumerated value out of range",
        })
    } else {
        Ok(enumerated)
    }
}

pub(crate) fn write_enum(dst: &mut BufferMut, enumerated: u8) {
    dst.write_u8(enumerated);
}
