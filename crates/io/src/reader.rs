//! Bounds-checked reader over an in-memory byte slice.

use crate::{IoError, IoResult};

/// Reads protocol objects from a byte slice, tracking the current position.
#[derive(Debug, Clone)]
pub struct MemoryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MemoryReader<'a> {
    /// Creates a reader over `data`, positioned at the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total length of the underlying slice.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying slice is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes remaining after the current position.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, count: usize) -> IoResult<&'a [u8]> {
        if self.remaining() < count {
            return Err(IoError::EndOfInput {
                needed: count,
                position: self.position,
            });
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> IoResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> IoResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::invalid_format(format!(
                "invalid boolean byte {other:#04x}"
            ))),
        }
    }

    pub fn read_i8(&mut self) -> IoResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> IoResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i16(&mut self) -> IoResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> IoResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> IoResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> IoResult<u64> {
        let bytes: [u8; 8] = self.take(8)?.try_into().expect("slice length checked");
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_i64(&mut self) -> IoResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> IoResult<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Reads a variable-length unsigned integer, rejecting values above `max`.
    pub fn read_var_int(&mut self, max: u64) -> IoResult<u64> {
        let first = self.read_u8()?;
        let value = match first {
            0xFD => self.read_u16()? as u64,
            0xFE => self.read_u32()? as u64,
            0xFF => self.read_u64()?,
            byte => byte as u64,
        };
        if value > max {
            return Err(IoError::ExceedsMaximum { value, max });
        }
        Ok(value)
    }

    /// Reads a length-prefixed byte string of at most `max` bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> IoResult<Vec<u8>> {
        let length = self.read_var_int(max as u64)? as usize;
        self.read_bytes(length)
    }

    /// Reads a length-prefixed UTF-8 string of at most `max` bytes.
    pub fn read_var_string(&mut self, max: usize) -> IoResult<String> {
        let bytes = self.read_var_bytes(max)?;
        String::from_utf8(bytes).map_err(|_| IoError::InvalidUtf8)
    }

    /// Reads a zero-padded UTF-8 string occupying exactly `length` bytes.
    pub fn read_fixed_string(&mut self, length: usize) -> IoResult<String> {
        let bytes = self.take(length)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(length);
        if bytes[end..].iter().any(|&b| b != 0) {
            return Err(IoError::invalid_format(
                "fixed string has data after the first NUL",
            ));
        }
        String::from_utf8(bytes[..end].to_vec()).map_err(|_| IoError::InvalidUtf8)
    }

    /// Reads everything left in the slice.
    pub fn read_to_end(&mut self) -> Vec<u8> {
        let slice = &self.data[self.position..];
        self.position = self.data.len();
        slice.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryWriter;

    #[test]
    fn round_trips_primitives() {
        let mut writer = BinaryWriter::new();
        writer.write_u8(0x42).unwrap();
        writer.write_u16(0x1234).unwrap();
        writer.write_u32(0xDEAD_BEEF).unwrap();
        writer.write_i64(-7).unwrap();
        writer.write_var_bytes(b"neo").unwrap();
        let bytes = writer.into_bytes();

        let mut reader = MemoryReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_i64().unwrap(), -7);
        assert_eq!(reader.read_var_bytes(16).unwrap(), b"neo");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn var_int_respects_caller_maximum() {
        let mut writer = BinaryWriter::new();
        writer.write_var_int(512).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = MemoryReader::new(&bytes);
        assert!(matches!(
            reader.read_var_int(256),
            Err(IoError::ExceedsMaximum { value: 512, max: 256 })
        ));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut reader = MemoryReader::new(&[0x01, 0x02]);
        assert!(matches!(
            reader.read_u32(),
            Err(IoError::EndOfInput { needed: 4, .. })
        ));
    }

    #[test]
    fn boolean_bytes_are_strict() {
        let mut reader = MemoryReader::new(&[0x02]);
        assert!(reader.read_bool().is_err());
    }
}
