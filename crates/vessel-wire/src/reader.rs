use crate::error::{Result, WireError};
use bytes::Buf;

macro_rules! check_remaining {
    ($self:expr, $needed:expr) => {
        if $self.remaining() < $needed {
            return Err(WireError::UnexpectedEof {
                needed: $needed,
                remaining: $self.remaining(),
            });
        }
    };
}

/// Extension trait over [`bytes::Buf`] for the little-endian primitives the
/// core's wire formats are built from.
pub trait BinaryReader: Buf {
    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        check_remaining!(self, 1);
        Ok(self.get_u8())
    }

    #[inline]
    fn read_i32_le(&mut self) -> Result<i32> {
        check_remaining!(self, 4);
        Ok(self.get_i32_le())
    }

    #[inline]
    fn read_u64_le(&mut self) -> Result<u64> {
        check_remaining!(self, 8);
        Ok(self.get_u64_le())
    }

    #[inline]
    fn read_i64_le(&mut self) -> Result<i64> {
        check_remaining!(self, 8);
        Ok(self.get_i64_le())
    }
}

impl<T: Buf + ?Sized> BinaryReader for T {}
