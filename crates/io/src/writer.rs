//! Binary writer producing the canonical wire encoding.

use crate::{IoError, IoResult, Serializable};

/// Writes protocol objects into a growable byte buffer.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes the writer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns a copy of the encoded bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.clone()
    }

    pub fn write_u8(&mut self, value: u8) -> IoResult<()> {
        self.buffer.push(value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> IoResult<()> {
        self.write_u8(u8::from(value))
    }

    pub fn write_i8(&mut self, value: i8) -> IoResult<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u16(&mut self, value: u16) -> IoResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> IoResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> IoResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> IoResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> IoResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> IoResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes raw bytes without a length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> IoResult<()> {
        self.buffer.extend_from_slice(value);
        Ok(())
    }

    /// Writes a variable-length unsigned integer.
    ///
    /// Values below 0xFD occupy one byte; larger ones use a 0xFD/0xFE/0xFF
    /// marker followed by 2, 4 or 8 little-endian bytes.
    pub fn write_var_int(&mut self, value: u64) -> IoResult<()> {
        if value < 0xFD {
            self.write_u8(value as u8)
        } else if value <= 0xFFFF {
            self.write_u8(0xFD)?;
            self.write_u16(value as u16)
        } else if value <= 0xFFFF_FFFF {
            self.write_u8(0xFE)?;
            self.write_u32(value as u32)
        } else {
            self.write_u8(0xFF)?;
            self.write_u64(value)
        }
    }

    /// Writes a length-prefixed byte string.
    pub fn write_var_bytes(&mut self, value: &[u8]) -> IoResult<()> {
        self.write_var_int(value.len() as u64)?;
        self.write_bytes(value)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_var_string(&mut self, value: &str) -> IoResult<()> {
        self.write_var_bytes(value.as_bytes())
    }

    /// Writes a UTF-8 string padded with zero bytes to exactly `length` bytes.
    pub fn write_fixed_string(&mut self, value: &str, length: usize) -> IoResult<()> {
        let bytes = value.as_bytes();
        if bytes.len() > length {
            return Err(IoError::invalid_format(format!(
                "string of {} bytes does not fit in {length}",
                bytes.len()
            )));
        }
        self.write_bytes(bytes)?;
        for _ in bytes.len()..length {
            self.write_u8(0)?;
        }
        Ok(())
    }

    /// Writes a serializable object.
    pub fn write_serializable<T: Serializable>(&mut self, value: &T) -> IoResult<()> {
        value.serialize(self)
    }

    /// Writes a count-prefixed sequence of serializable objects.
    pub fn write_serializable_list<T: Serializable>(&mut self, values: &[T]) -> IoResult<()> {
        self.write_var_int(values.len() as u64)?;
        for value in values {
            value.serialize(self)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_int_thresholds() {
        for (value, encoded) in [
            (0x00u64, vec![0x00]),
            (0xFC, vec![0xFC]),
            (0xFD, vec![0xFD, 0xFD, 0x00]),
            (0xFFFF, vec![0xFD, 0xFF, 0xFF]),
            (0x10000, vec![0xFE, 0x00, 0x00, 0x01, 0x00]),
            (
                0x1_0000_0000,
                vec![0xFF, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00],
            ),
        ] {
            let mut writer = BinaryWriter::new();
            writer.write_var_int(value).unwrap();
            assert_eq!(writer.into_bytes(), encoded, "value {value:#x}");
        }
    }

    #[test]
    fn fixed_string_pads_with_zeroes() {
        let mut writer = BinaryWriter::new();
        writer.write_fixed_string("neo", 8).unwrap();
        assert_eq!(writer.into_bytes(), b"neo\0\0\0\0\0");
    }

    #[test]
    fn fixed_string_rejects_overlong_input() {
        let mut writer = BinaryWriter::new();
        assert!(writer.write_fixed_string("overlong", 4).is_err());
    }
}
