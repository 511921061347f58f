//! The serialization trait implemented by every protocol object.

use crate::{BinaryWriter, IoResult, MemoryReader};

/// Protocol objects with a canonical binary encoding.
pub trait Serializable {
    /// The exact number of bytes `serialize` will produce.
    fn size(&self) -> usize;

    /// Writes the canonical encoding of the object.
    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()>;

    /// Reads an object from its canonical encoding.
    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self>
    where
        Self: Sized;
}

/// Blanket conveniences over [`Serializable`].
pub trait SerializableExt: Serializable {
    /// Encodes the object into a fresh byte vector.
    fn to_array(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        // Writing into a memory buffer cannot fail.
        self.serialize(&mut writer)
            .expect("serialization into memory buffer");
        writer.into_bytes()
    }

    /// Decodes an object from `data`, requiring the input to be fully consumed.
    fn from_array(data: &[u8]) -> IoResult<Self>
    where
        Self: Sized,
    {
        let mut reader = MemoryReader::new(data);
        let value = Self::deserialize(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(crate::IoError::invalid_format(format!(
                "{} trailing bytes after object",
                reader.remaining()
            )));
        }
        Ok(value)
    }
}

impl<T: Serializable> SerializableExt for T {}

/// Free helpers for sequences of serializable objects.
pub mod helper {
    use super::Serializable;
    use crate::{IoResult, MemoryReader};

    /// Reads a count-prefixed sequence of at most `max` objects.
    pub fn deserialize_list<T: Serializable>(
        reader: &mut MemoryReader<'_>,
        max: usize,
    ) -> IoResult<Vec<T>> {
        let count = reader.read_var_int(max as u64)? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(T::deserialize(reader)?);
        }
        Ok(items)
    }

    /// Serialized size of a count-prefixed sequence.
    pub fn list_size<T: Serializable>(items: &[T]) -> usize {
        crate::var_size(items.len() as u64) + items.iter().map(Serializable::size).sum::<usize>()
    }
}
