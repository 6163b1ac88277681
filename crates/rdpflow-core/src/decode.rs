use thiserror::Error;

use crate::Buffer;

/// A result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("not enough bytes to decode: received {received} bytes, expected {expected} bytes")]
    NotEnoughBytes { received: usize, expected: usize },
    #[error("invalid `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("unexpected message type ({got:#04x})")]
    UnexpectedMessageType { got: u8 },
    #[error("unsupported version ({got})")]
    UnsupportedVersion { got: u8 },
    #[error("malformed {encoding} string")]
    MalformedString { encoding: &'static str },
}

impl DecodeError {
    pub fn not_enough_bytes(received: usize, expected: usize) -> Self {
        Self::NotEnoughBytes { received, expected }
    }

    pub fn invalid_field(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidField { field, reason }
    }

    pub fn unexpected_message_type(got: u8) -> Self {
        Self::UnexpectedMessageType { got }
    }

    pub fn unsupported_version(got: u8) -> Self {
        Self::UnsupportedVersion { got }
    }
}

/// Trait for types that can be decoded from a [`Buffer`].
///
/// Decoding consumes bytes by advancing the buffer's cursor. On error the
/// cursor position is unspecified; a connection that hit a decode error is
/// torn down, never resynchronized.
pub trait Decode: Sized {
    fn decode(src: &mut Buffer) -> DecodeResult<Self>;
}

/// Decodes a value of type `T` from the remaining bytes of a buffer.
pub fn decode<T: Decode>(src: &mut Buffer) -> DecodeResult<T> {
    T::decode(src)
}
