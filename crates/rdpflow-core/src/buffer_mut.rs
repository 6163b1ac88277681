use bytes::Bytes;

use crate::{Buffer, CharacterSet, EncodeError, EncodeResult};

/// A uniquely-owned, growable write buffer, optionally carrying reserved
/// header room in front of the data region so enclosing framing layers can
/// be prepended without copying the payload.
///
/// Memory layout:
///
/// ```not_rust
/// [ header room | data region        ]
///               ^ start              ^ end (writes append here)
/// ```
///
/// `BufferMut` is the only way to produce bytes; once
/// [`freeze`](BufferMut::freeze)n into a [`Buffer`] the storage becomes
/// shared and read-only.
#[derive(Debug, Default)]
pub struct BufferMut {
    inner: Vec<u8>,
    start: usize,
}

impl BufferMut {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    /// Reserves `header` bytes of room in front of the data region for
    /// later [`prepend_slice`](BufferMut::prepend_slice) calls.
    pub fn with_header_room(header: usize, capacity: usize) -> Self {
        let mut inner = Vec::with_capacity(header + capacity);
        inner.resize(header, 0);
        Self {
            inner,
            start: header,
        }
    }

    /// Length of the data region (header room excluded).
    pub fn len(&self) -> usize {
        self.inner.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining header room available for prepending.
    pub fn header_room(&self) -> usize {
        self.start
    }

    /// The data region written so far.
    pub fn filled(&self) -> &[u8] {
        &self.inner[self.start..]
    }

    pub fn write_slice(&mut self, slice: &[u8]) {
        self.inner.extend_from_slice(slice);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.inner.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_slice(&value.to_le_bytes());
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_slice(&value.to_le_bytes());
    }

    pub fn write_u16_be(&mut self, value: u16) {
        self.write_slice(&value.to_be_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_slice(&value.to_le_bytes());
    }

    pub fn write_i16_be(&mut self, value: i16) {
        self.write_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_slice(&value.to_le_bytes());
    }

    pub fn write_u32_be(&mut self, value: u32) {
        self.write_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_slice(&value.to_le_bytes());
    }

    /// Writes `n` zero bytes.
    pub fn write_padding(&mut self, n: usize) {
        self.inner.resize(self.inner.len() + n, 0);
    }

    /// Mirror of [`Buffer::read_packed_u16`](crate::Buffer::read_packed_u16).
    pub fn write_packed_u16(&mut self, value: u16) -> EncodeResult<()> {
        if value > 0x7fff {
            return Err(EncodeError::field_overflow(
                "packed u16",
                "value exceeds 15 bits",
            ));
        }
        if value > 0x7f {
            self.write_u16_be(value | 0x8000);
        } else {
            self.write_u8(value.to_le_bytes()[0]);
        }
        Ok(())
    }

    /// Mirror of [`Buffer::read_packed_i16`](crate::Buffer::read_packed_i16).
    pub fn write_packed_i16(&mut self, value: i16) -> EncodeResult<()> {
        let magnitude = value.unsigned_abs();
        if magnitude > 0x3fff {
            return Err(EncodeError::field_overflow(
                "packed i16",
                "magnitude exceeds 14 bits",
            ));
        }
        let sign = if value < 0 { 0x40u8 } else { 0x00u8 };
        if magnitude > 0x3f {
            self.write_u8(0x80 | sign | (magnitude >> 8).to_le_bytes()[0]);
            self.write_u8((magnitude & 0xff).to_le_bytes()[0]);
        } else {
            self.write_u8(sign | magnitude.to_le_bytes()[0]);
        }
        Ok(())
    }

    /// Mirror of [`Buffer::read_var_u32`](crate::Buffer::read_var_u32).
    pub fn write_var_u32(&mut self, value: u32) -> EncodeResult<()> {
        let bytes = value.to_be_bytes();
        if value <= 0x3f {
            self.write_u8(bytes[3]);
        } else if value <= 0x3fff {
            self.write_u8(0x40 | bytes[2]);
            self.write_u8(bytes[3]);
        } else if value <= 0x003f_ffff {
            self.write_u8(0x80 | bytes[1]);
            self.write_slice(&bytes[2..]);
        } else if value <= 0x3fff_ffff {
            self.write_u8(0xc0 | bytes[0]);
            self.write_slice(&bytes[1..]);
        } else {
            return Err(EncodeError::field_overflow(
                "variable u32",
                "value exceeds 30 bits",
            ));
        }
        Ok(())
    }

    /// Mirror of [`Buffer::read_var_i32_le`](crate::Buffer::read_var_i32_le).
    pub fn write_var_i32_le(&mut self, value: i32) {
        let mut rest = value.cast_unsigned();
        loop {
            let group = (rest & 0x7f).to_le_bytes()[0];
            rest >>= 7;
            if rest == 0 {
                self.write_u8(group);
                break;
            }
            self.write_u8(group | 0x80);
        }
    }

    /// Writes the string without a terminator.
    pub fn write_string(&mut self, value: &str, charset: CharacterSet) {
        match charset {
            CharacterSet::Ansi => self.write_slice(value.as_bytes()),
            CharacterSet::Unicode => {
                for unit in value.encode_utf16() {
                    self.write_u16(unit);
                }
            }
        }
    }

    /// Writes the string followed by one NUL terminator in the charset's
    /// unit size.
    pub fn write_string_nul(&mut self, value: &str, charset: CharacterSet) {
        self.write_string(value, charset);
        self.write_padding(charset.unit_size());
    }

    /// Mutable view of the data region, for filling from I/O reads.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.inner[self.start..]
    }

    /// Shrinks the data region to `len` bytes (e.g. after a short read
    /// into a larger region).
    pub fn truncate(&mut self, len: usize) {
        self.inner.truncate(self.start + len);
    }

    /// Prepends `slice` in front of the data region, consuming header room.
    ///
    /// # Panics
    ///
    /// Panics when the reserved header room is insufficient; callers size
    /// the header room for the framing they are going to apply, so running
    /// out is a programming error.
    pub fn prepend_slice(&mut self, slice: &[u8]) {
        assert!(
            slice.len() <= self.start,
            "prepend of {} bytes exceeds {} bytes of header room",
            slice.len(),
            self.start
        );
        self.start -= slice.len();
        self.inner[self.start..self.start + slice.len()].copy_from_slice(slice);
    }

    /// Converts into a shared read-only [`Buffer`] over the data region
    /// (any unused header room is dropped from the view, zero-copy).
    pub fn freeze(self) -> Buffer {
        let start = self.start;
        Buffer::from_bytes(Bytes::from(self.inner).slice(start..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Buffer;

    #[test]
    fn prepend_consumes_header_room() {
        let mut buf = BufferMut::with_header_room(8, 16);
        buf.write_slice(b"payload");
        buf.prepend_slice(&[0xaa, 0xbb]);
        assert_eq!(buf.header_room(), 6);

        let frozen = buf.freeze();
        assert_eq!(frozen.as_slice(), b"\xaa\xbbpayload");
    }

    #[test]
    #[should_panic(expected = "exceeds 0 bytes of header room")]
    fn prepend_without_room_is_fatal() {
        let mut buf = BufferMut::with_capacity(4);
        buf.write_u8(1);
        buf.prepend_slice(&[0xaa]);
    }

    #[test]
    fn packed_u16_round_trip() {
        for value in [0u16, 0x7f, 0x80, 0x1234, 0x7fff] {
            let mut dst = BufferMut::with_capacity(2);
            dst.write_packed_u16(value).unwrap();
            let mut src = dst.freeze();
            assert_eq!(src.read_packed_u16().unwrap(), value);
        }

        let mut dst = BufferMut::with_capacity(2);
        assert!(dst.write_packed_u16(0x8000).is_err());
    }

    #[test]
    fn var_i32_le_round_trip() {
        for value in [0i32, 1, -1, 127, 128, -300, i32::MAX, i32::MIN] {
            let mut dst = BufferMut::with_capacity(5);
            dst.write_var_i32_le(value);
            let mut src = dst.freeze();
            assert_eq!(src.read_var_i32_le().unwrap(), value, "value {value}");
        }
    }
}
