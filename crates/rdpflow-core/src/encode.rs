use thiserror::Error;

use crate::{Buffer, BufferMut};

/// A result type for encoding operations.
pub type EncodeResult<T> = Result<T, EncodeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum EncodeError {
    #[error("`{field}` does not fit the wire field: {reason}")]
    FieldOverflow {
        field: &'static str,
        reason: &'static str,
    },
    #[error("invalid `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

impl EncodeError {
    pub fn field_overflow(field: &'static str, reason: &'static str) -> Self {
        Self::FieldOverflow { field, reason }
    }

    pub fn invalid_field(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidField { field, reason }
    }
}

/// Trait for types that can be encoded into a [`BufferMut`].
pub trait Encode {
    fn encode(&self, dst: &mut BufferMut) -> EncodeResult<()>;

    /// Returns the name associated with this PDU.
    fn name(&self) -> &'static str;

    /// Computes the size in bytes for this PDU, so enclosing layers can
    /// write their length fields before the body is encoded.
    fn size(&self) -> usize;
}

/// Encodes the PDU into a fresh frozen [`Buffer`].
pub fn encode_to_buffer<T: Encode>(pdu: &T) -> EncodeResult<Buffer> {
    let mut dst = BufferMut::with_capacity(pdu.size());
    pdu.encode(&mut dst)?;
    Ok(dst.freeze())
}
