use core::str::from_utf8;

use crate::prelude::*;

use crate::error::{FdtError, Result};
use crate::spec::Phandle;

use fallible_iterator::FallibleIterator;

/// Read access to a device tree property's name and value.
///
/// Implemented both by property handles of the direct parser and by
/// properties of an unflattened tree, so value decoding is written once.
///
/// Property values are untyped byte strings; the typed accessors simply
/// decode big-endian cells or null terminated strings at the caller's
/// request and fail with [`FdtError::BadOffset`] or [`FdtError::BadString`]
/// when the value cannot be read that way.
pub trait PropReader<'dt> {
    type NodeType;

    /// Returns the raw value of the property.
    #[doc(hidden)]
    fn propbuf(&self) -> &'dt [u8];

    /// Returns the name of the property within the device tree.
    fn name(&self) -> Result<&'dt str>;

    /// Returns the node which this property is contained within.
    fn node(&self) -> Self::NodeType;

    /// Returns the length of the property value in bytes.
    #[inline]
    fn length(&self) -> usize {
        self.propbuf().len()
    }

    /// Read a big-endian [`u32`] at `offset` within this property's value.
    #[inline]
    fn read_u32(&self, offset: usize) -> Result<u32> {
        self.propbuf()
            .read_be_u32(offset)
            .or(Err(FdtError::BadOffset))
    }

    /// Read a big-endian [`u64`] at `offset` within this property's value.
    #[inline]
    fn read_u64(&self, offset: usize) -> Result<u64> {
        self.propbuf()
            .read_be_u64(offset)
            .or(Err(FdtError::BadOffset))
    }

    /// A phandle is simply a u32 cell; this is [`PropReader::read_u32`]
    /// under a clearer name.
    #[inline]
    fn read_phandle(&self, offset: usize) -> Result<Phandle> {
        self.read_u32(offset)
    }

    /// Fold `cells` consecutive 32-bit cells at `offset` into one value.
    ///
    /// Address and size encodings use one cell (u32) or two cells (u64)
    /// depending on the `#address-cells`/`#size-cells` in force.
    fn read_cells(&self, offset: usize, cells: u32) -> Result<u64> {
        let mut val = 0u64;
        for i in 0..cells as usize {
            val = (val << 32) | u64::from(self.read_u32(offset + 4 * i)?);
        }
        Ok(val)
    }

    /// Returns the property value interpreted as a string.
    ///
    /// The value is taken up to its first null byte (or in full when no
    /// null is present) and must be valid UTF-8.
    fn as_str(&self) -> Result<&'dt str> {
        let buf = self.propbuf();
        let raw = match buf.iter().position(|&b| b == 0) {
            Some(i) => &buf[..i],
            None => buf,
        };
        Ok(from_utf8(raw)?)
    }

    /// Returns an iterator over the null separated strings of the value.
    ///
    /// Properties such as `compatible` hold a list of null terminated
    /// strings back to back.
    fn strings(&self) -> StringListIter<'dt> {
        StringListIter {
            buf: self.propbuf(),
            offset: 0,
        }
    }

    /// Returns this property's value as a raw slice.
    #[inline]
    fn raw(&self) -> &'dt [u8] {
        self.propbuf()
    }
}

/// An iterator over the strings of a string list property.
#[derive(Clone)]
pub struct StringListIter<'dt> {
    buf: &'dt [u8],
    offset: usize,
}

impl<'dt> StringListIter<'dt> {
    pub(crate) fn new(buf: &'dt [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'dt> FallibleIterator for StringListIter<'dt> {
    type Error = FdtError;
    type Item = &'dt str;

    fn next(&mut self) -> Result<Option<&'dt str>> {
        if self.offset >= self.buf.len() {
            return Ok(None);
        }
        let raw = self.buf.read_bstring0(self.offset)?;
        self.offset += raw.len() + 1;
        Ok(Some(from_utf8(raw)?))
    }
}
