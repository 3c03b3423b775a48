use core::mem::size_of;

#[derive(Debug, Copy, Clone)]
pub enum SliceReadError {
    UnexpectedEndOfInput,
}

pub(crate) type SliceReadResult<T> = Result<T, SliceReadError>;

/// Bounds checked big-endian reads out of a byte slice.
///
/// All reads are performed byte-wise, so neither the slice nor the offset
/// carry any alignment requirement.
pub(crate) trait SliceRead<'a> {
    fn read_be_u32(&self, pos: usize) -> SliceReadResult<u32>;
    fn read_be_u64(&self, pos: usize) -> SliceReadResult<u64>;
    /// Read a null terminated string starting at `pos`, excluding the null.
    fn read_bstring0(&self, pos: usize) -> SliceReadResult<&'a [u8]>;
}

macro_rules! be_read {
    ( $buf:ident, $type:ident , $off:expr ) => {
        match $off
            .checked_add(size_of::<$type>())
            .and_then(|end| $buf.get($off..end))
        {
            Some(raw) => {
                let mut bytes = [0u8; size_of::<$type>()];
                bytes.copy_from_slice(raw);
                Ok($type::from_be_bytes(bytes))
            }
            None => Err(SliceReadError::UnexpectedEndOfInput),
        }
    };
}

impl<'a> SliceRead<'a> for &'a [u8] {
    fn read_be_u32(&self, pos: usize) -> SliceReadResult<u32> {
        be_read!(self, u32, pos)
    }

    fn read_be_u64(&self, pos: usize) -> SliceReadResult<u64> {
        be_read!(self, u64, pos)
    }

    fn read_bstring0(&self, pos: usize) -> SliceReadResult<&'a [u8]> {
        let tail = self
            .get(pos..)
            .ok_or(SliceReadError::UnexpectedEndOfInput)?;
        match tail.iter().position(|&b| b == 0) {
            Some(i) => Ok(&tail[..i]),
            None => Err(SliceReadError::UnexpectedEndOfInput),
        }
    }
}

/// Bounds checked big-endian writes into a byte slice.
pub(crate) trait SliceWrite {
    fn write_be_u32(&mut self, pos: usize, val: u32) -> SliceReadResult<()>;
    fn write_be_u64(&mut self, pos: usize, val: u64) -> SliceReadResult<()>;
}

macro_rules! be_write {
    ( $buf:ident, $type:ident , $off:expr , $val:expr ) => {
        match $off
            .checked_add(size_of::<$type>())
            .and_then(|end| $buf.get_mut($off..end))
        {
            Some(raw) => {
                raw.copy_from_slice(&$val.to_be_bytes());
                Ok(())
            }
            None => Err(SliceReadError::UnexpectedEndOfInput),
        }
    };
}

impl SliceWrite for [u8] {
    fn write_be_u32(&mut self, pos: usize, val: u32) -> SliceReadResult<()> {
        be_write!(self, u32, pos, val)
    }

    fn write_be_u64(&mut self, pos: usize, val: u64) -> SliceReadResult<()> {
        be_write!(self, u64, pos, val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn be_reads_are_bounds_checked() {
        let data = [0xd0u8, 0x0d, 0xfe, 0xed, 0x00];
        let buf: &[u8] = &data;
        assert_eq!(buf.read_be_u32(0).unwrap(), 0xd00d_feed);
        assert!(buf.read_be_u32(2).is_err());
        assert!(buf.read_be_u32(usize::max_value()).is_err());
        assert!(buf.read_be_u64(0).is_err());
    }

    #[test]
    fn bstring_reads_stop_at_null() {
        let data = b"chosen\0bootargs\0";
        let buf: &[u8] = &data[..];
        assert_eq!(buf.read_bstring0(0).unwrap(), b"chosen");
        assert_eq!(buf.read_bstring0(7).unwrap(), b"bootargs");
        assert!(buf.read_bstring0(data.len()).is_err());
        let unterminated: &[u8] = b"abc";
        assert!(unterminated.read_bstring0(0).is_err());
    }

    #[test]
    fn be_writes_round_trip() {
        let mut data = [0u8; 8];
        data.write_be_u32(0, 0x1234_5678).unwrap();
        data.write_be_u32(4, 0x9abc_def0).unwrap();
        let buf: &[u8] = &data;
        assert_eq!(buf.read_be_u64(0).unwrap(), 0x1234_5678_9abc_def0);
        assert!(data.write_be_u32(6, 0).is_err());
    }
}
