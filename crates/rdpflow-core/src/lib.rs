//! Common building blocks for the rdpflow protocol engine: reference-counted
//! byte buffers with a sequential cursor, their uniquely-owned write-side
//! counterpart, and the decode/encode traits every PDU implements.

mod buffer;
mod buffer_mut;
mod decode;
mod encode;
mod pool;

pub use buffer::{Buffer, CharacterSet};
pub use buffer_mut::BufferMut;
pub use decode::{decode, Decode, DecodeError, DecodeResult};
pub use encode::{encode_to_buffer, Encode, EncodeError, EncodeResult};
pub use pool::BufferPool;
