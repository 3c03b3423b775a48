use core::mem::size_of;

use memoffset::offset_of;

use crate::base::lookup;
use crate::base::parse::align4;
use crate::error::{FdtError, Result};
use crate::priv_util::SliceWrite;
use crate::spec::{fdt_prop_header, fdt_reserve_entry, FdtTok};

use super::tree::FdtEdit;

/// Token plus property header bytes that precede a property's value.
const PROP_VALUE_OFF: usize = 4 + size_of::<fdt_prop_header>();

impl<'b> FdtEdit<'b> {
    /// Resolve an absolute path against the current state of the tree.
    pub fn path_offset(&self, path: &str) -> Result<usize> {
        lookup::path_offset(&self.as_fdt(), path)
    }

    /// Find a direct subnode of the node at `offset` by name.
    pub fn subnode_offset(&self, offset: usize, name: &str) -> Result<usize> {
        lookup::subnode_offset(&self.as_fdt(), offset, name)
    }

    /// Returns the value of the named property of the node at `offset`.
    pub fn property(&self, offset: usize, name: &str) -> Result<&[u8]> {
        lookup::property(&self.as_fdt(), offset, name)
    }

    /// Make `name` on the node at `offset` hold exactly `len` value bytes
    /// and return the value slice for the caller to fill.
    ///
    /// An existing property is resized in place. A missing one is
    /// inserted at the front of the node's property run, with its name
    /// deduplicated against the string table.
    pub fn setprop_placeholder(
        &mut self,
        offset: usize,
        name: &str,
        len: usize,
    ) -> Result<&mut [u8]> {
        let existing = lookup::find_prop(&self.as_fdt(), offset, name)?;
        let value_abs = match existing {
            Some((prop_off, oldlen)) => {
                self.splice_struct(prop_off + PROP_VALUE_OFF, align4(oldlen), align4(len))?;
                let abs = self.off_dt_struct() + prop_off;
                self.buf
                    .write_be_u32(abs + 4 + offset_of!(fdt_prop_header, len), len as u32)
                    .unwrap();
                abs + PROP_VALUE_OFF
            }
            None => {
                let insert = lookup::props_start(&self.as_fdt(), offset)?;
                let (nameoff, allocated) = self.find_add_string(name.as_bytes())?;
                let record_len = PROP_VALUE_OFF + align4(len);
                if let Err(e) = self.splice_struct(insert, 0, record_len) {
                    // Drop the name that was just appended so a failed
                    // call leaves the tree untouched.
                    if allocated {
                        self.del_last_string(name.len() + 1);
                    }
                    return Err(e);
                }
                let abs = self.off_dt_struct() + insert;
                self.buf.write_be_u32(abs, FdtTok::Prop as u32).unwrap();
                self.buf
                    .write_be_u32(abs + 4 + offset_of!(fdt_prop_header, len), len as u32)
                    .unwrap();
                self.buf
                    .write_be_u32(abs + 4 + offset_of!(fdt_prop_header, nameoff), nameoff as u32)
                    .unwrap();
                abs + PROP_VALUE_OFF
            }
        };
        // Keep the alignment padding zeroed so packed trees compare byte
        // for byte.
        for byte in &mut self.buf[value_abs + len..value_abs + align4(len)] {
            *byte = 0;
        }
        self.debug_check_layout();
        Ok(&mut self.buf[value_abs..value_abs + len])
    }

    /// Set `name` on the node at `offset` to the given value, creating
    /// the property when missing.
    pub fn setprop(&mut self, offset: usize, name: &str, val: &[u8]) -> Result<()> {
        let buf = self.setprop_placeholder(offset, name, val.len())?;
        buf.copy_from_slice(val);
        Ok(())
    }

    /// Set a property to a single big-endian u32 cell.
    pub fn setprop_u32(&mut self, offset: usize, name: &str, val: u32) -> Result<()> {
        self.setprop(offset, name, &val.to_be_bytes())
    }

    /// Set a property to a big-endian u64 value (two cells).
    pub fn setprop_u64(&mut self, offset: usize, name: &str, val: u64) -> Result<()> {
        self.setprop(offset, name, &val.to_be_bytes())
    }

    /// Set a property to a NUL terminated string.
    pub fn setprop_str(&mut self, offset: usize, name: &str, val: &str) -> Result<()> {
        let buf = self.setprop_placeholder(offset, name, val.len() + 1)?;
        buf[..val.len()].copy_from_slice(val.as_bytes());
        buf[val.len()] = 0;
        Ok(())
    }

    /// Remove the named property of the node at `offset`.
    ///
    /// Its name is left in the string table; names are shared, so they
    /// are never reclaimed.
    pub fn delprop(&mut self, offset: usize, name: &str) -> Result<()> {
        let (prop_off, len) =
            lookup::find_prop(&self.as_fdt(), offset, name)?.ok_or(FdtError::NotFound)?;
        self.splice_struct(prop_off, PROP_VALUE_OFF + align4(len), 0)?;
        self.debug_check_layout();
        Ok(())
    }

    /// Add an empty subnode under the node at `offset`, after its
    /// properties and before any existing subnode. Returns the new
    /// node's offset.
    pub fn add_subnode(&mut self, offset: usize, name: &str) -> Result<usize> {
        match lookup::subnode_offset(&self.as_fdt(), offset, name) {
            Ok(_) => return Err(FdtError::Exists),
            Err(FdtError::NotFound) => (),
            Err(e) => return Err(e),
        }

        let insert = lookup::node_header_end(&self.as_fdt(), offset)?;
        let name_cell = align4(name.len() + 1);
        let node_len = 4 + name_cell + 4;
        self.splice_struct(insert, 0, node_len)?;

        let abs = self.off_dt_struct() + insert;
        self.buf
            .write_be_u32(abs, FdtTok::BeginNode as u32)
            .unwrap();
        for byte in &mut self.buf[abs + 4..abs + 4 + name_cell] {
            *byte = 0;
        }
        self.buf[abs + 4..abs + 4 + name.len()].copy_from_slice(name.as_bytes());
        self.buf
            .write_be_u32(abs + 4 + name_cell, FdtTok::EndNode as u32)
            .unwrap();
        self.debug_check_layout();
        Ok(insert)
    }

    /// Remove the node at `offset` and everything below it.
    pub fn del_node(&mut self, offset: usize) -> Result<()> {
        let span_end = lookup::node_span_end(&self.as_fdt(), offset)?;
        self.splice_struct(offset, span_end - offset, 0)?;
        self.debug_check_layout();
        Ok(())
    }

    /// Append an entry to the memory reservation table.
    pub fn add_mem_rsv(&mut self, address: u64, size: u64) -> Result<()> {
        let index = self.num_mem_rsv();
        self.splice_rsv(index, 0, 1)?;
        let abs = self.off_mem_rsvmap() + index * size_of::<fdt_reserve_entry>();
        self.buf
            .write_be_u64(abs + offset_of!(fdt_reserve_entry, address), address)
            .unwrap();
        self.buf
            .write_be_u64(abs + offset_of!(fdt_reserve_entry, size), size)
            .unwrap();
        self.debug_check_layout();
        Ok(())
    }

    /// Remove the `index`th entry of the memory reservation table.
    pub fn del_mem_rsv(&mut self, index: usize) -> Result<()> {
        if index >= self.num_mem_rsv() {
            return Err(FdtError::NotFound);
        }
        self.splice_rsv(index, 1, 0)?;
        self.debug_check_layout();
        Ok(())
    }
}
