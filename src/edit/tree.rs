use core::mem::size_of;

use memoffset::offset_of;

use crate::base::parse::next_token;
use crate::base::Fdt;
use crate::error::{FdtError, Result};
use crate::priv_util::{SliceRead, SliceWrite};
use crate::spec::{
    fdt_header, fdt_reserve_entry, FdtTok, FDT_FIRST_SUPPORTED_VERSION,
    FDT_LAST_SUPPORTED_VERSION, FDT_MAGIC,
};

macro_rules! header_get {
    ( $self:ident, $f:ident ) => {
        // Reborrow immutably; the reads are implemented on shared slices.
        (&*$self.buf)
            .read_be_u32(offset_of!(fdt_header, $f))
            .unwrap() as usize
    };
}

macro_rules! header_set {
    ( $self:ident, $f:ident , $val:expr ) => {
        $self
            .buf
            .write_be_u32(offset_of!(fdt_header, $f), $val as u32)
            .unwrap()
    };
}

/// Block geometry of a source tree, gathered before normalization.
struct BlockInfo {
    total: usize,
    boot_cpuid: usize,
    rsv_off: usize,
    /// Size of the reservation table including its terminator entry.
    rsv_size: usize,
    struct_off: usize,
    struct_size: usize,
    strings_off: usize,
    strings_size: usize,
    misordered: bool,
}

fn block_info(fdt: &Fdt) -> Result<BlockInfo> {
    let rsv_size = (fdt.reserved_entries().count() + 1) * size_of::<fdt_reserve_entry>();

    // v16 headers do not record the structure block size; walk the tokens
    // to the End token to measure it.
    let struct_size = if fdt.version() >= FDT_LAST_SUPPORTED_VERSION {
        fdt.size_dt_struct()
    } else {
        let buf = fdt.struct_region();
        let mut off = 0;
        while next_token(buf, &mut off)?.is_some() {}
        off
    };

    // The canonical layout this editor maintains: header, reservation
    // table, structure block, strings block, free space. sizeof(header)
    // is 40, which satisfies the table's 8 byte alignment.
    let misordered = fdt.off_mem_rsvmap() < size_of::<fdt_header>()
        || fdt.off_dt_struct() < fdt.off_mem_rsvmap() + rsv_size
        || fdt.off_dt_strings() < fdt.off_dt_struct() + struct_size
        || fdt.totalsize() < fdt.off_dt_strings() + fdt.size_dt_strings();

    Ok(BlockInfo {
        total: fdt.totalsize(),
        boot_cpuid: fdt.boot_cpuid_phys() as usize,
        rsv_off: fdt.off_mem_rsvmap(),
        rsv_size,
        struct_off: fdt.off_dt_struct(),
        struct_size,
        strings_off: fdt.off_dt_strings(),
        strings_size: fdt.size_dt_strings(),
        misordered,
    })
}

/// Copy the three data blocks of `src` into `dst` back to back in
/// canonical order, leaving room for the header. `dst` must hold
/// `BlockInfo` worth of packed data; the caller writes the header after.
fn pack_blocks(src: &[u8], dst: &mut [u8], info: &BlockInfo) {
    let rsv_dst = size_of::<fdt_header>();
    let struct_dst = rsv_dst + info.rsv_size;
    let strings_dst = struct_dst + info.struct_size;

    // Copy the live reservation entries and write a fresh terminator.
    let entry_bytes = info.rsv_size - size_of::<fdt_reserve_entry>();
    dst[rsv_dst..rsv_dst + entry_bytes]
        .copy_from_slice(&src[info.rsv_off..info.rsv_off + entry_bytes]);
    for byte in &mut dst[rsv_dst + entry_bytes..struct_dst] {
        *byte = 0;
    }

    dst[struct_dst..struct_dst + info.struct_size]
        .copy_from_slice(&src[info.struct_off..info.struct_off + info.struct_size]);
    dst[strings_dst..strings_dst + info.strings_size]
        .copy_from_slice(&src[info.strings_off..info.strings_off + info.strings_size]);
}

/// An in-place editor over a flattened device tree held in a mutable
/// buffer.
///
/// While a tree is open its header `totalsize` equals the buffer length,
/// so the space between the end of the strings block and `totalsize` is
/// the working capacity every mutation draws from. [`FdtEdit::pack()`]
/// shrinks `totalsize` back down to the bytes in use.
///
/// Mutations move the tail of the blob with a single splice primitive and
/// fail with [`FdtError::NoSpace`] once the capacity is exhausted, leaving
/// the tree intact.
pub struct FdtEdit<'b> {
    pub(super) buf: &'b mut [u8],
}

impl<'b> FdtEdit<'b> {
    /// Open the tree at the start of `buf` for editing, using the whole of
    /// `buf` as capacity.
    ///
    /// The header is normalized to version 17: a v16 source has its
    /// structure block measured, and a source whose blocks are stored out
    /// of canonical order is repacked. Repacking builds the packed copy in
    /// the free space past the old tree first, so it needs the buffer to
    /// hold old and packed tree at once.
    pub fn open(buf: &'b mut [u8]) -> Result<Self> {
        let info = {
            let fdt = Fdt::from_bytes(buf)?;
            block_info(&fdt)?
        };
        let capacity = buf.len();
        let mut edit = Self { buf };

        if !info.misordered {
            header_set!(edit, version, FDT_LAST_SUPPORTED_VERSION);
            header_set!(edit, size_dt_struct, info.struct_size);
            header_set!(edit, totalsize, capacity);
            edit.debug_check_layout();
            return Ok(edit);
        }

        let newsize =
            size_of::<fdt_header>() + info.rsv_size + info.struct_size + info.strings_size;
        if info.total + newsize > capacity {
            return Err(FdtError::NoSpace);
        }
        {
            let (src, scratch) = edit.buf.split_at_mut(info.total);
            pack_blocks(src, scratch, &info);
        }
        edit.buf.copy_within(info.total..info.total + newsize, 0);
        edit.write_packed_header(&info, capacity);
        edit.debug_check_layout();
        Ok(edit)
    }

    /// Copy `source` into `buf` and open it there, using the whole of
    /// `buf` as capacity.
    pub fn open_into(source: &Fdt, buf: &'b mut [u8]) -> Result<Self> {
        let info = block_info(source)?;
        let capacity = buf.len();

        if !info.misordered {
            if capacity < info.total {
                return Err(FdtError::NoSpace);
            }
            buf[..info.total].copy_from_slice(source.buf());
            let edit = Self { buf };
            header_set!(edit, version, FDT_LAST_SUPPORTED_VERSION);
            header_set!(edit, size_dt_struct, info.struct_size);
            header_set!(edit, totalsize, capacity);
            edit.debug_check_layout();
            return Ok(edit);
        }

        let newsize =
            size_of::<fdt_header>() + info.rsv_size + info.struct_size + info.strings_size;
        if capacity < newsize {
            return Err(FdtError::NoSpace);
        }
        pack_blocks(source.buf(), buf, &info);
        let mut edit = Self { buf };
        edit.write_packed_header(&info, capacity);
        edit.debug_check_layout();
        Ok(edit)
    }

    /// Build a minimal valid tree in `buf`: an empty reservation table and
    /// a root node with no properties. Needs at least 72 bytes.
    pub fn create_empty_tree(buf: &'b mut [u8]) -> Result<Self> {
        const RSV_OFF: usize = size_of::<fdt_header>();
        const STRUCT_OFF: usize = RSV_OFF + size_of::<fdt_reserve_entry>();
        // Begin token, empty name cell, end token, End token.
        const STRUCT_SIZE: usize = 16;
        const MIN: usize = STRUCT_OFF + STRUCT_SIZE;

        if buf.len() < MIN {
            return Err(FdtError::NoSpace);
        }
        for byte in &mut buf[..MIN] {
            *byte = 0;
        }

        let capacity = buf.len();
        let edit = Self { buf };
        header_set!(edit, magic, FDT_MAGIC);
        header_set!(edit, totalsize, capacity);
        header_set!(edit, off_dt_struct, STRUCT_OFF);
        header_set!(edit, off_dt_strings, MIN);
        header_set!(edit, off_mem_rsvmap, RSV_OFF);
        header_set!(edit, version, FDT_LAST_SUPPORTED_VERSION);
        header_set!(edit, last_comp_version, FDT_FIRST_SUPPORTED_VERSION);
        header_set!(edit, size_dt_strings, 0);
        header_set!(edit, size_dt_struct, STRUCT_SIZE);

        // The reservation terminator and the root's empty name are already
        // zero; only the tokens themselves need writing.
        edit.buf
            .write_be_u32(STRUCT_OFF, FdtTok::BeginNode as u32)
            .unwrap();
        edit.buf
            .write_be_u32(STRUCT_OFF + 8, FdtTok::EndNode as u32)
            .unwrap();
        edit.buf
            .write_be_u32(STRUCT_OFF + 12, FdtTok::End as u32)
            .unwrap();
        edit.debug_check_layout();
        Ok(edit)
    }

    /// Slide the data blocks down against the header and shrink
    /// `totalsize` to the bytes in use.
    ///
    /// The tree stays open, but with no capacity left; reopen it in a
    /// larger buffer to grow it again.
    pub fn pack(&mut self) -> Result<()> {
        let rsv_off = self.off_mem_rsvmap();
        let struct_off = self.off_dt_struct();
        let struct_size = self.size_dt_struct();
        let strings_off = self.off_dt_strings();
        let strings_size = self.size_dt_strings();
        let entry_bytes = self.num_mem_rsv() * size_of::<fdt_reserve_entry>();

        let rsv_dst = size_of::<fdt_header>();
        let struct_dst = rsv_dst + entry_bytes + size_of::<fdt_reserve_entry>();
        let strings_dst = struct_dst + struct_size;

        // Left-to-right moves never overwrite a later source because the
        // blocks are kept in canonical order.
        self.buf.copy_within(rsv_off..rsv_off + entry_bytes, rsv_dst);
        for byte in &mut self.buf[rsv_dst + entry_bytes..struct_dst] {
            *byte = 0;
        }
        self.buf
            .copy_within(struct_off..struct_off + struct_size, struct_dst);
        self.buf
            .copy_within(strings_off..strings_off + strings_size, strings_dst);

        header_set!(self, off_mem_rsvmap, rsv_dst);
        header_set!(self, off_dt_struct, struct_dst);
        header_set!(self, off_dt_strings, strings_dst);
        header_set!(self, totalsize, strings_dst + strings_size);
        self.debug_check_layout();
        Ok(())
    }

    /// Pack the tree and end the edit, returning the packed total size.
    /// The first that many bytes of the caller's buffer hold the finished
    /// blob.
    pub fn finish(mut self) -> Result<usize> {
        self.pack()?;
        Ok(self.totalsize())
    }

    /// A read-only view of the tree in its current state.
    pub fn as_fdt(&self) -> Fdt<'_> {
        Fdt::new_unchecked(self.buf)
    }

    /// Total working capacity of the underlying buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Block layout sanity check; compiles to nothing in release builds.
    pub(super) fn debug_check_layout(&self) {
        debug_assert!(self.off_mem_rsvmap() >= size_of::<fdt_header>());
        debug_assert!(
            self.off_dt_struct() >= self.off_mem_rsvmap() + size_of::<fdt_reserve_entry>()
        );
        debug_assert_eq!(self.off_dt_struct() % size_of::<u32>(), 0);
        debug_assert!(self.off_dt_strings() >= self.off_dt_struct() + self.size_dt_struct());
        debug_assert!(self.data_size() <= self.totalsize());
        debug_assert!(self.totalsize() <= self.buf.len());
    }

    fn write_packed_header(&mut self, info: &BlockInfo, capacity: usize) {
        let rsv_dst = size_of::<fdt_header>();
        let struct_dst = rsv_dst + info.rsv_size;
        let strings_dst = struct_dst + info.struct_size;

        header_set!(self, magic, FDT_MAGIC);
        header_set!(self, totalsize, capacity);
        header_set!(self, off_dt_struct, struct_dst);
        header_set!(self, off_dt_strings, strings_dst);
        header_set!(self, off_mem_rsvmap, rsv_dst);
        header_set!(self, version, FDT_LAST_SUPPORTED_VERSION);
        header_set!(self, last_comp_version, FDT_FIRST_SUPPORTED_VERSION);
        header_set!(self, boot_cpuid_phys, info.boot_cpuid);
        header_set!(self, size_dt_strings, info.strings_size);
        header_set!(self, size_dt_struct, info.struct_size);
    }

    pub(super) fn totalsize(&self) -> usize {
        header_get!(self, totalsize)
    }

    pub(super) fn off_mem_rsvmap(&self) -> usize {
        header_get!(self, off_mem_rsvmap)
    }

    pub(super) fn off_dt_struct(&self) -> usize {
        header_get!(self, off_dt_struct)
    }

    pub(super) fn size_dt_struct(&self) -> usize {
        header_get!(self, size_dt_struct)
    }

    pub(super) fn off_dt_strings(&self) -> usize {
        header_get!(self, off_dt_strings)
    }

    pub(super) fn size_dt_strings(&self) -> usize {
        header_get!(self, size_dt_strings)
    }

    /// Bytes in use: everything up to the end of the strings block.
    fn data_size(&self) -> usize {
        self.off_dt_strings() + self.size_dt_strings()
    }

    pub(super) fn num_mem_rsv(&self) -> usize {
        self.as_fdt().reserved_entries().count()
    }

    /// Replace `oldlen` bytes at `splicepoint` with room for `newlen`
    /// bytes by sliding everything behind them, without touching any
    /// header field. Offsets are buffer-absolute.
    fn splice(&mut self, splicepoint: usize, oldlen: usize, newlen: usize) -> Result<()> {
        let end = self.data_size();
        let old_end = splicepoint.checked_add(oldlen).ok_or(FdtError::BadOffset)?;
        if splicepoint > end || old_end > end {
            return Err(FdtError::BadOffset);
        }
        if end - oldlen + newlen > self.totalsize() {
            return Err(FdtError::NoSpace);
        }
        self.buf.copy_within(old_end..end, splicepoint + newlen);
        Ok(())
    }

    /// Splice within the reservation table. `index` is an entry index;
    /// `oldn` entries are replaced by room for `newn` entries.
    pub(super) fn splice_rsv(&mut self, index: usize, oldn: usize, newn: usize) -> Result<()> {
        let entry = size_of::<fdt_reserve_entry>();
        let point = self.off_mem_rsvmap() + index * entry;
        self.splice(point, oldn * entry, newn * entry)?;
        let delta_add = newn * entry;
        let delta_sub = oldn * entry;
        header_set!(self, off_dt_struct, self.off_dt_struct() + delta_add - delta_sub);
        header_set!(
            self,
            off_dt_strings,
            self.off_dt_strings() + delta_add - delta_sub
        );
        Ok(())
    }

    /// Splice within the structure block. `offset` is relative to the
    /// block's start, as node offsets are.
    pub(super) fn splice_struct(&mut self, offset: usize, oldlen: usize, newlen: usize) -> Result<()> {
        debug_assert!(offset + oldlen <= self.size_dt_struct());
        let point = self.off_dt_struct() + offset;
        self.splice(point, oldlen, newlen)?;
        header_set!(self, size_dt_struct, self.size_dt_struct() + newlen - oldlen);
        header_set!(self, off_dt_strings, self.off_dt_strings() + newlen - oldlen);
        Ok(())
    }

    /// Extend the strings block by `newlen` bytes at its end.
    fn splice_strings(&mut self, newlen: usize) -> Result<()> {
        let point = self.off_dt_strings() + self.size_dt_strings();
        self.splice(point, 0, newlen)?;
        header_set!(self, size_dt_strings, self.size_dt_strings() + newlen);
        Ok(())
    }

    /// Find `s` in the string table, taking any NUL terminated occurrence
    /// including the tail of a longer string. Returns its offset.
    fn find_string(&self, s: &[u8]) -> Option<usize> {
        let tab = &self.buf[self.off_dt_strings()..self.data_size()];
        tab.windows(s.len() + 1)
            .position(|w| &w[..s.len()] == s && w[s.len()] == 0)
    }

    /// Return the string table offset for `s`, appending it if no
    /// existing occurrence can be shared. The flag reports whether the
    /// table grew, so a failed caller can roll the growth back.
    pub(super) fn find_add_string(&mut self, s: &[u8]) -> Result<(usize, bool)> {
        if let Some(off) = self.find_string(s) {
            return Ok((off, false));
        }
        let new_off = self.size_dt_strings();
        self.splice_strings(s.len() + 1)?;
        let abs = self.off_dt_strings() + new_off;
        self.buf[abs..abs + s.len()].copy_from_slice(s);
        self.buf[abs + s.len()] = 0;
        Ok((new_off, true))
    }

    /// Drop the last `len` bytes of the string table. Only used to undo a
    /// [`FdtEdit::find_add_string()`] whose follow-up splice failed.
    pub(super) fn del_last_string(&mut self, len: usize) {
        header_set!(self, size_dt_strings, self.size_dt_strings() - len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The accessors read the header through a shared reborrow of the
    // mutable buffer; keep them exercised directly.
    #[test]
    fn header_fields_read_back_while_open() {
        let mut buf = [0u8; 128];
        let edit = FdtEdit::create_empty_tree(&mut buf).unwrap();
        assert_eq!(edit.totalsize(), 128);
        assert_eq!(edit.off_mem_rsvmap(), size_of::<fdt_header>());
        assert_eq!(
            edit.off_dt_struct(),
            size_of::<fdt_header>() + size_of::<fdt_reserve_entry>()
        );
        assert_eq!(edit.size_dt_struct(), 16);
        assert_eq!(edit.off_dt_strings(), edit.off_dt_struct() + 16);
        assert_eq!(edit.size_dt_strings(), 0);
    }
}
