use core::cmp::min;
use core::mem::size_of;
use core::slice;

use memoffset::offset_of;

use crate::error::{FdtError, Result};
use crate::priv_util::SliceRead;
use crate::spec::{
    fdt_header, FDT_FIRST_SUPPORTED_VERSION, FDT_LAST_SUPPORTED_VERSION, FDT_MAGIC,
};

use super::iters::{
    FdtCompatibleNodeIter, FdtItemIter, FdtNodeIter, FdtPropIter, ReserveEntryIter,
};
use super::node::FdtNode;
use super::parse::TokenIter;

use fallible_iterator::FallibleIterator;

macro_rules! get_be32_field {
    ( $f:ident, $s:ident , $buf:expr ) => {
        $buf.read_be_u32(offset_of!($s, $f))
    };
}

/// A read-only flattened device tree over a borrowed byte buffer.
///
/// Construction validates the header per the v0.3 specification: the magic
/// number, the supported version window (version >= 0x10, last compatible
/// version <= 0x11) and the block layout described by the offset table.
/// After that, all header reads are infallible.
///
/// The buffer needs no particular alignment; every multi-byte field is read
/// byte-wise.
#[derive(Copy, Clone, Debug)]
pub struct Fdt<'dt> {
    buf: &'dt [u8],
}

impl<'dt> PartialEq for Fdt<'dt> {
    fn eq(&self, other: &Self) -> bool {
        self.buf as *const [u8] == other.buf as *const [u8]
    }
}

impl<'dt> Fdt<'dt> {
    pub const MIN_HEADER_SIZE: usize = size_of::<fdt_header>();

    /// Verify that the buffer begins with the device tree magic number.
    #[inline]
    pub fn verify_magic(buf: &[u8]) -> Result<()> {
        if get_be32_field!(magic, fdt_header, buf)? != FDT_MAGIC {
            Err(FdtError::BadMagic)
        } else {
            Ok(())
        }
    }

    /// Return the `totalsize` field of the header after checking the magic.
    ///
    /// The full size of a blob handed over by firmware is often unknown up
    /// front. This reads it from the first [`Self::MIN_HEADER_SIZE`] bytes
    /// so the caller can size the real slice and call
    /// [`Fdt::from_bytes()`].
    #[inline]
    pub fn read_totalsize(buf: &[u8]) -> Result<usize> {
        if buf.len() < Self::MIN_HEADER_SIZE {
            return Err(FdtError::Truncated);
        }
        Self::verify_magic(buf)?;
        Ok(get_be32_field!(totalsize, fdt_header, buf)? as usize)
    }

    /// Validate the header of a device tree blob.
    ///
    /// Checks the magic number, the supported version window, that
    /// `totalsize` fits the supplied buffer, and that the offset table
    /// describes aligned, non-overlapping blocks inside `totalsize`.
    pub fn check_header(buf: &[u8]) -> Result<()> {
        if buf.len() < Self::MIN_HEADER_SIZE {
            return Err(FdtError::Truncated);
        }
        Self::verify_magic(buf)?;

        let version = get_be32_field!(version, fdt_header, buf)?;
        let last_comp = get_be32_field!(last_comp_version, fdt_header, buf)?;
        if version < FDT_FIRST_SUPPORTED_VERSION || last_comp > FDT_LAST_SUPPORTED_VERSION {
            return Err(FdtError::BadVersion);
        }

        let total = get_be32_field!(totalsize, fdt_header, buf)? as usize;
        if total < Self::MIN_HEADER_SIZE || total > buf.len() {
            return Err(FdtError::Truncated);
        }

        let off_rsvmap = get_be32_field!(off_mem_rsvmap, fdt_header, buf)? as usize;
        let off_struct = get_be32_field!(off_dt_struct, fdt_header, buf)? as usize;
        let off_strings = get_be32_field!(off_dt_strings, fdt_header, buf)? as usize;
        let size_strings = get_be32_field!(size_dt_strings, fdt_header, buf)? as usize;

        if off_rsvmap < Self::MIN_HEADER_SIZE || off_rsvmap % 8 != 0 || off_rsvmap > total {
            return Err(FdtError::BadLayout);
        }
        if off_struct % 4 != 0 || off_struct > total {
            return Err(FdtError::BadLayout);
        }
        let strings_end = off_strings
            .checked_add(size_strings)
            .ok_or(FdtError::BadLayout)?;
        if strings_end > total {
            return Err(FdtError::BadLayout);
        }

        // Before v17 the header does not record the structure block's size,
        // so the overlap check is only possible on v17 blobs.
        if version >= FDT_LAST_SUPPORTED_VERSION {
            let size_struct = get_be32_field!(size_dt_struct, fdt_header, buf)? as usize;
            let struct_end = off_struct
                .checked_add(size_struct)
                .ok_or(FdtError::BadLayout)?;
            if struct_end > total {
                return Err(FdtError::BadLayout);
            }
            let overlap_start = core::cmp::max(off_struct, off_strings);
            let overlap_end = min(struct_end, strings_end);
            if overlap_start < overlap_end {
                return Err(FdtError::BadLayout);
            }
        }

        Ok(())
    }

    /// Construct a parser over the provided byte slice.
    ///
    /// The slice must hold at least `totalsize` bytes; any bytes past
    /// `totalsize` are ignored.
    pub fn from_bytes(buf: &'dt [u8]) -> Result<Self> {
        Self::check_header(buf)?;
        let total = get_be32_field!(totalsize, fdt_header, buf)? as usize;
        Ok(Self { buf: &buf[..total] })
    }

    /// Construct a parser from a raw pointer to a blob of unknown size.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for reads of [`Self::MIN_HEADER_SIZE`] bytes
    /// and, once the header is read, for the full `totalsize` the header
    /// reports. The memory must remain valid and unmodified for `'dt`.
    #[inline]
    pub unsafe fn from_raw_pointer(addr: *const u8) -> Result<Self> {
        let buf: &[u8] = slice::from_raw_parts(addr, Self::MIN_HEADER_SIZE);
        let buf_size = Self::read_totalsize(buf)?;
        let buf: &'dt [u8] = slice::from_raw_parts(addr, buf_size);
        Self::from_bytes(buf)
    }

    /// Wrap a buffer whose header the caller has already validated.
    ///
    /// Used by the editor, which keeps the header consistent across every
    /// mutation it performs.
    pub(crate) fn new_unchecked(buf: &'dt [u8]) -> Self {
        debug_assert!(Self::check_header(buf).is_ok());
        let total = get_be32_field!(totalsize, fdt_header, buf).unwrap() as usize;
        Self { buf: &buf[..total] }
    }

    /// Returns the totalsize field of the header.
    #[inline]
    #[must_use]
    pub fn totalsize(&self) -> usize {
        get_be32_field!(totalsize, fdt_header, self.buf).unwrap() as usize
    }

    /// Returns the offset of the memory reservation table.
    #[inline]
    #[must_use]
    pub fn off_mem_rsvmap(&self) -> usize {
        get_be32_field!(off_mem_rsvmap, fdt_header, self.buf).unwrap() as usize
    }

    /// Returns the offset of the structure block.
    #[inline]
    #[must_use]
    pub fn off_dt_struct(&self) -> usize {
        get_be32_field!(off_dt_struct, fdt_header, self.buf).unwrap() as usize
    }

    /// Returns the offset of the strings block.
    #[inline]
    #[must_use]
    pub fn off_dt_strings(&self) -> usize {
        get_be32_field!(off_dt_strings, fdt_header, self.buf).unwrap() as usize
    }

    /// Returns the version field of the header.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        get_be32_field!(version, fdt_header, self.buf).unwrap()
    }

    /// Returns the last compatible version field of the header.
    #[inline]
    #[must_use]
    pub fn last_comp_version(&self) -> u32 {
        get_be32_field!(last_comp_version, fdt_header, self.buf).unwrap()
    }

    /// Returns the physical CPU id the system boots on.
    #[inline]
    #[must_use]
    pub fn boot_cpuid_phys(&self) -> u32 {
        get_be32_field!(boot_cpuid_phys, fdt_header, self.buf).unwrap()
    }

    /// Returns the size of the strings block in bytes.
    #[inline]
    #[must_use]
    pub fn size_dt_strings(&self) -> usize {
        get_be32_field!(size_dt_strings, fdt_header, self.buf).unwrap() as usize
    }

    /// Returns the size of the structure block in bytes.
    ///
    /// Only meaningful on v17 blobs; v16 headers do not carry this field.
    #[inline]
    #[must_use]
    pub fn size_dt_struct(&self) -> usize {
        get_be32_field!(size_dt_struct, fdt_header, self.buf).unwrap() as usize
    }

    /// The structure block as a slice. Node offsets index into this slice.
    pub(crate) fn struct_region(&self) -> &'dt [u8] {
        let start = self.off_dt_struct();
        let end = if self.version() >= FDT_LAST_SUPPORTED_VERSION {
            start.saturating_add(self.size_dt_struct())
        } else {
            // v16 headers do not record the block size; the End token
            // terminates iteration instead.
            self.buf.len()
        };
        let end = min(end, self.buf.len());
        &self.buf[min(start, end)..end]
    }

    /// The strings block as a slice.
    pub(crate) fn strings_region(&self) -> &'dt [u8] {
        let start = min(self.off_dt_strings(), self.buf.len());
        let end = min(start.saturating_add(self.size_dt_strings()), self.buf.len());
        &self.buf[start..end]
    }

    /// Resolve a property name offset against the string table.
    pub(crate) fn prop_name(&self, nameoff: usize) -> Result<&'dt [u8]> {
        self.strings_region()
            .read_bstring0(nameoff)
            .or(Err(FdtError::BadStructure))
    }

    /// Returns the magic field of the header.
    #[inline]
    #[must_use]
    pub fn magic(&self) -> u32 {
        get_be32_field!(magic, fdt_header, self.buf).unwrap()
    }

    /// Returns an iterator over the memory reservation table.
    #[must_use]
    pub fn reserved_entries(&self) -> ReserveEntryIter<'_, 'dt> {
        ReserveEntryIter::new(self)
    }

    /// Returns an iterator over the structure block's raw tokens.
    #[must_use]
    pub fn tokens(&self) -> TokenIter<'dt> {
        TokenIter::new(self.struct_region())
    }

    /// Returns an iterator over [`FdtNode`] handles in document order.
    pub fn nodes(&self) -> FdtNodeIter<'_, 'dt> {
        FdtNodeIter(FdtItemIter::new(self))
    }

    /// Returns an iterator over every property in the tree.
    #[must_use]
    pub fn props(&self) -> FdtPropIter<'_, 'dt> {
        FdtPropIter(FdtItemIter::new(self))
    }

    /// Returns an iterator over nodes and properties interleaved in
    /// document order.
    pub fn items(&self) -> FdtItemIter<'_, 'dt> {
        FdtItemIter::new(self)
    }

    /// Returns an iterator over nodes whose `compatible` list contains
    /// `string`.
    pub fn compatible_nodes<'s, 'a: 's>(
        &'a self,
        string: &'s str,
    ) -> FdtCompatibleNodeIter<'s, 'a, 'dt> {
        FdtCompatibleNodeIter {
            iter: self.items(),
            string,
        }
    }

    /// Returns a handle to the root node.
    pub fn root(&self) -> Result<Option<FdtNode<'_, 'dt>>> {
        self.nodes().next()
    }

    pub fn buf(&self) -> &'dt [u8] {
        self.buf
    }
}
