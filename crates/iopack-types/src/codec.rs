//! Big-endian byte cursor used by every binary table in iopack.

use crate::error::TypeError;

/// Growable big-endian output buffer.
#[derive(Clone, Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// LEB128-style variable-length unsigned integer.
    pub fn write_varint(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value > 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Varint length followed by UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) {
        self.write_varint(value.len() as u64);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Overwrite a previously written `u32` at `offset`.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Append zero bytes until the length is a multiple of `alignment`.
    pub fn pad_to(&mut self, alignment: usize) {
        if alignment > 1 {
            let rem = self.buf.len() % alignment;
            if rem != 0 {
                self.buf.resize(self.buf.len() + alignment - rem, 0);
            }
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked big-endian reader over a byte slice.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Move the cursor to an absolute offset.
    pub fn seek(&mut self, offset: usize) -> Result<(), TypeError> {
        if offset > self.data.len() {
            return Err(TypeError::Truncated {
                offset,
                needed: offset - self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], TypeError> {
        if len > self.remaining() {
            return Err(TypeError::Truncated {
                offset: self.pos,
                needed: len,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TypeError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    pub fn read_u8(&mut self) -> Result<u8, TypeError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, TypeError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, TypeError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, TypeError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, TypeError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_varint(&mut self) -> Result<u64, TypeError> {
        let start = self.pos;
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(TypeError::VarintOverflow { offset: start });
            }
        }
    }

    pub fn read_string(&mut self) -> Result<String, TypeError> {
        let start = self.pos;
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| TypeError::Truncated {
            offset: start,
            needed: usize::MAX,
        })?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| TypeError::InvalidUtf8 { offset: start })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_values() {
        let mut w = ByteWriter::new();
        w.write_u8(7);
        w.write_u16(0x0102);
        w.write_u32(0xDEADBEEF);
        w.write_i32(-5);
        w.write_u64(u64::MAX - 1);
        let bytes = w.into_inner();
        assert_eq!(&bytes[1..3], &[0x01, 0x02]);

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u16().unwrap(), 0x0102);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_i32().unwrap(), -5);
        assert_eq!(r.read_u64().unwrap(), u64::MAX - 1);
        assert!(r.is_empty());
    }

    #[test]
    fn varint_sizes() {
        let mut w = ByteWriter::new();
        w.write_varint(0);
        w.write_varint(42);
        w.write_varint(1_000_000);
        w.write_varint(u64::MAX);
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_varint().unwrap(), 0);
        assert_eq!(r.position(), 1);
        assert_eq!(r.read_varint().unwrap(), 42);
        assert_eq!(r.read_varint().unwrap(), 1_000_000);
        assert_eq!(r.read_varint().unwrap(), u64::MAX);
    }

    #[test]
    fn truncated_varint() {
        let mut r = ByteReader::new(&[0x80]);
        assert!(matches!(r.read_varint(), Err(TypeError::Truncated { .. })));
    }

    #[test]
    fn overlong_varint() {
        let mut r = ByteReader::new(&[0xFF; 11]);
        assert!(matches!(
            r.read_varint(),
            Err(TypeError::VarintOverflow { offset: 0 })
        ));
    }

    #[test]
    fn strings() {
        let mut w = ByteWriter::new();
        w.write_string("/Game/Hero");
        w.write_string("");
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), "/Game/Hero");
        assert_eq!(r.read_string().unwrap(), "");
    }

    #[test]
    fn invalid_utf8() {
        let mut r = ByteReader::new(&[2, 0xC3, 0x28]);
        assert_eq!(r.read_string(), Err(TypeError::InvalidUtf8 { offset: 0 }));
    }

    #[test]
    fn read_past_end() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert_eq!(
            r.read_u32(),
            Err(TypeError::Truncated { offset: 0, needed: 4 })
        );
    }

    #[test]
    fn seek_bounds() {
        let data = [0u8; 8];
        let mut r = ByteReader::new(&data);
        assert!(r.seek(8).is_ok());
        assert!(r.is_empty());
        assert!(r.seek(9).is_err());
    }

    #[test]
    fn patch_and_pad() {
        let mut w = ByteWriter::new();
        w.write_u32(0);
        w.write_u8(1);
        w.patch_u32(0, 99);
        w.pad_to(8);
        assert_eq!(w.len(), 8);
        let bytes = w.into_inner();
        assert_eq!(ByteReader::new(&bytes).read_u32().unwrap(), 99);
    }
}
