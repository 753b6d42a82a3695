use crate::error::Result;
use bytes::BufMut;

/// Extension trait over [`bytes::BufMut`] mirroring [`crate::reader::BinaryReader`].
pub trait BinaryWriter: BufMut {
    #[inline]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put_u8(value);
        Ok(())
    }

    #[inline]
    fn write_i32_le(&mut self, value: i32) -> Result<()> {
        self.put_i32_le(value);
        Ok(())
    }

    #[inline]
    fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.put_u64_le(value);
        Ok(())
    }

    #[inline]
    fn write_i64_le(&mut self, value: i64) -> Result<()> {
        self.put_i64_le(value);
        Ok(())
    }
}

impl<T: BufMut + ?Sized> BinaryWriter for T {}
