//! Boot parameter extraction from a flattened device tree.
//!
//! These run before any allocator exists, so everything here works on
//! the raw token stream: [`scan`] drives a visitor over every node, and
//! [`BootContext`] holds what the early scanners pull out (cell widths,
//! the command line, initrd bounds) while memory banks and reservations
//! go straight into a [`MemBlock`].
//!
//! [`setup_boot`] ties the whole phase together: it accepts either a
//! device tree blob or a legacy ATAG list, normalizes the latter through
//! [`crate::atag::atags_to_fdt`], matches the machine, and runs the
//! scans. When firmware hands over neither, a built-in tag list stands
//! in so boot can limp on.

use crate::prelude::*;

use crate::atag::{atags_to_fdt, default_tags, AtagList, CmdlinePolicy};
use crate::base::parse::{next_token, Token};
use crate::base::{lookup, Fdt};
use crate::base::lookup::MachineDesc;
use crate::edit::FdtEdit;
use crate::error::{FdtError, Result};
use crate::memblock::{BootAlloc, MemBlock, PhysMap, NO_NODE};
use crate::spec::FDT_MAGIC;

/// Memory described by the built-in fallback tag list: 16 MiB at zero.
const DEFAULT_MEM_SIZE: u32 = 0x0100_0000;

/// What a [`scan`] visitor sees per node.
#[derive(Clone, Copy)]
pub struct ScanNode<'dt> {
    /// Offset of the node's `BEGIN_NODE` token within the structure
    /// block, usable with the [`lookup`] helpers.
    pub offset: usize,
    /// The node's leaf name, unit address included. Raw bytes; node
    /// names need not be UTF-8.
    pub name: &'dt [u8],
    /// Nesting depth. The root is 0.
    pub depth: usize,
}

/// Walk every node of `fdt` in stream order, handing each to `visitor`.
///
/// The visitor returning `true` stops the walk; the return value tells
/// whether it did. Structural defects in the stream fail the walk.
pub fn scan<'dt, F>(fdt: &Fdt<'dt>, mut visitor: F) -> Result<bool>
where
    F: FnMut(ScanNode<'dt>) -> bool,
{
    let buf = fdt.struct_region();
    let mut off = 0;
    let mut depth = 0usize;
    loop {
        let tok_off = off;
        match next_token(buf, &mut off)? {
            Some(Token::BeginNode { name }) => {
                if visitor(ScanNode {
                    offset: tok_off,
                    name,
                    depth,
                }) {
                    return Ok(true);
                }
                depth += 1;
            }
            Some(Token::EndNode) => {
                depth = depth.checked_sub(1).ok_or(FdtError::BadStructure)?;
            }
            Some(_) => (),
            None => return Ok(false),
        }
    }
}

/// Compare a null terminated property value against a name.
fn cstr_eq(value: &[u8], s: &[u8]) -> bool {
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    &value[..end] == s
}

/// A null terminated property value as a string, `None` when empty or
/// not UTF-8.
fn cstr_value(value: &[u8]) -> Option<&str> {
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    match core::str::from_utf8(&value[..end]) {
        Ok("") => None,
        Ok(s) => Some(s),
        Err(_) => None,
    }
}

/// Fold big-endian cells at `offset` into one value. More than two
/// cells fold like the reference behavior: high cells shift out.
fn read_cells_at(buf: &[u8], offset: usize, cells: u32) -> Option<u64> {
    let mut val = 0u64;
    for i in 0..cells as usize {
        val = (val << 32) | u64::from(buf.read_be_u32(offset + 4 * i).ok()?);
    }
    Some(val)
}

/// A whole property value folded as cells; tolerates either cell width.
fn fold_cells(value: &[u8]) -> Option<u64> {
    if value.len() % 4 != 0 {
        return None;
    }
    let cells = (value.len() / 4) as u32;
    if !(1..=2).contains(&cells) {
        return None;
    }
    read_cells_at(value, 0, cells)
}

/// Parameters the early boot scanners extract from the blob.
///
/// Threaded explicitly through the boot path; nothing here lives in
/// globals.
#[derive(Debug, Clone, Copy)]
pub struct BootContext<'dt> {
    /// Root `#address-cells`, defaulted to 1 when absent.
    pub address_cells: u32,
    /// Root `#size-cells`, defaulted to 1 when absent.
    pub size_cells: u32,
    /// `/chosen/bootargs`, when present and non-empty.
    pub bootargs: Option<&'dt str>,
    /// Initrd bounds from `/chosen`, as `(start, end)` addresses.
    pub initrd: Option<(u64, u64)>,
}

impl<'dt> Default for BootContext<'dt> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'dt> BootContext<'dt> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            address_cells: 1,
            size_cells: 1,
            bootargs: None,
            initrd: None,
        }
    }

    /// Cache `#address-cells`/`#size-cells` from the root node.
    ///
    /// Only the depth-0 node is consulted; missing cells keep their
    /// defaults of 1.
    pub fn scan_root(&mut self, fdt: &Fdt<'dt>) -> Result<()> {
        let mut address_cells = 1;
        let mut size_cells = 1;
        scan(fdt, |node| {
            if node.depth != 0 {
                return true;
            }
            if let Ok(v) = lookup::property_u32(fdt, node.offset, "#address-cells") {
                address_cells = v;
            }
            if let Ok(v) = lookup::property_u32(fdt, node.offset, "#size-cells") {
                size_cells = v;
            }
            true
        })?;
        self.address_cells = address_cells;
        self.size_cells = size_cells;
        log::debug!(
            "root cells: address {} size {}",
            self.address_cells,
            self.size_cells
        );
        Ok(())
    }

    /// Pull the command line and initrd bounds out of `/chosen`.
    ///
    /// Accepts `chosen` or `chosen@0` at depth 1. Initrd bounds fold
    /// one or two cells each and require both ends to be present.
    pub fn scan_chosen(&mut self, fdt: &Fdt<'dt>) -> Result<()> {
        let mut bootargs = None;
        let mut initrd = None;
        scan(fdt, |node| {
            if node.depth != 1 || (node.name != b"chosen" && node.name != b"chosen@0") {
                return false;
            }
            if let Ok(value) = lookup::property(fdt, node.offset, "bootargs") {
                bootargs = cstr_value(value);
            }
            let start = lookup::property(fdt, node.offset, "linux,initrd-start")
                .ok()
                .and_then(fold_cells);
            let end = lookup::property(fdt, node.offset, "linux,initrd-end")
                .ok()
                .and_then(fold_cells);
            if let (Some(start), Some(end)) = (start, end) {
                initrd = Some((start, end));
            }
            true
        })?;
        self.bootargs = bootargs;
        self.initrd = initrd;
        if let Some(args) = self.bootargs {
            log::debug!("bootargs: {}", args);
        }
        if let Some((start, end)) = self.initrd {
            log::debug!("initrd: {:#x}..{:#x}", start, end);
        }
        Ok(())
    }

    /// Feed every memory bank the blob describes into `memblock`.
    ///
    /// Banks come from depth-1 nodes with `device_type == "memory"`, or
    /// the legacy bare `memory@0` name when `device_type` is absent.
    /// `linux,usable-memory` wins over `reg`; zero sized banks are
    /// skipped. Pairs decode per the cached cell widths, so
    /// [`BootContext::scan_root`] must have run first.
    pub fn scan_memory<P, A>(&self, fdt: &Fdt<'dt>, memblock: &mut MemBlock<P, A>) -> Result<()>
    where
        P: PhysMap,
        A: BootAlloc,
    {
        let pair = 4 * (self.address_cells + self.size_cells) as usize;
        if pair == 0 {
            return Ok(());
        }
        let mut failed = None;
        scan(fdt, |node| {
            if node.depth != 1 {
                return false;
            }
            let is_memory = match lookup::property(fdt, node.offset, "device_type") {
                Ok(value) => cstr_eq(value, b"memory"),
                Err(_) => node.name == b"memory@0",
            };
            if !is_memory {
                return false;
            }
            let reg = lookup::property(fdt, node.offset, "linux,usable-memory")
                .or_else(|_| lookup::property(fdt, node.offset, "reg"));
            let reg = match reg {
                Ok(value) => value,
                Err(_) => return false,
            };

            let mut off = 0;
            while off + pair <= reg.len() {
                let base = read_cells_at(reg, off, self.address_cells);
                let size = read_cells_at(reg, off + 4 * self.address_cells as usize, self.size_cells);
                off += pair;
                let (base, size) = match (base, size) {
                    (Some(b), Some(s)) => (b, s),
                    _ => return false,
                };
                if size == 0 {
                    continue;
                }
                log::debug!("memory bank {:#x}+{:#x}", base, size);
                if let Err(e) = memblock.add(base, size, NO_NODE) {
                    failed = Some(e);
                    return true;
                }
            }
            false
        })?;
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One-shot driver: the three scans in order, then the blob's
    /// reservation table into `memblock`'s reserved set.
    pub fn from_fdt<P, A>(fdt: &Fdt<'dt>, memblock: &mut MemBlock<P, A>) -> Result<Self>
    where
        P: PhysMap,
        A: BootAlloc,
    {
        let mut ctx = Self::new();
        ctx.scan_root(fdt)?;
        ctx.scan_chosen(fdt)?;
        ctx.scan_memory(fdt, memblock)?;
        for entry in fdt.reserved_entries() {
            memblock.reserve(entry.address, entry.size)?;
        }
        Ok(ctx)
    }
}

/// Everything [`setup_boot`] establishes.
pub struct BootInfo<'dt, 'm, M> {
    pub context: BootContext<'dt>,
    /// The matched machine, when any candidate's `compatible` matched.
    pub machine: Option<&'m M>,
}

fn tags_into_scratch<'dt>(
    words: &[u32],
    scratch: &'dt mut [u8],
    policy: CmdlinePolicy,
) -> Result<&'dt [u8]> {
    FdtEdit::create_empty_tree(scratch)?;
    atags_to_fdt(words, scratch, policy)?;
    Ok(scratch)
}

/// Establish the boot configuration from whatever firmware provided.
///
/// `input` is either a flattened device tree or a legacy ATAG list,
/// told apart by the FDT magic; an ATAG list is first converted into
/// `scratch` by the bridge. With no input at all, a built-in tag list
/// describing 16 MiB at address zero stands in so this layer never
/// crashes for lack of one.
///
/// The machine is matched against `candidates` by most specific
/// `compatible` string; no match is reported but not fatal.
pub fn setup_boot<'dt, 'm, M, P, A>(
    candidates: &'m [M],
    input: Option<&'dt [u8]>,
    scratch: &'dt mut [u8],
    policy: CmdlinePolicy,
    memblock: &mut MemBlock<P, A>,
) -> Result<BootInfo<'dt, 'm, M>>
where
    M: MachineDesc,
    P: PhysMap,
    A: BootAlloc,
{
    let blob = match input {
        Some(buf) if buf.read_be_u32(0).map(|m| m == FDT_MAGIC).unwrap_or(false) => buf,
        Some(buf) => {
            let atags = AtagList::from_bytes(buf)?;
            log::debug!("converting boot tag list to a device tree");
            tags_into_scratch(atags.words(), scratch, policy)?
        }
        None => {
            log::warn!("no device tree and no tag list, using the built-in defaults");
            let tags = default_tags(DEFAULT_MEM_SIZE);
            tags_into_scratch(&tags, scratch, policy)?
        }
    };

    let fdt = Fdt::from_bytes(blob)?;
    let machine = lookup::match_machine(&fdt, candidates)?;
    if machine.is_none() {
        log::warn!("device tree matches no known machine");
    }
    let context = BootContext::from_fdt(&fdt, memblock)?;
    Ok(BootInfo { context, machine })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cstr_comparisons_stop_at_the_null() {
        assert!(cstr_eq(b"memory\0", b"memory"));
        assert!(cstr_eq(b"memory", b"memory"));
        assert!(!cstr_eq(b"memory2\0", b"memory"));
        assert_eq!(cstr_value(b"console=ttyS0\0"), Some("console=ttyS0"));
        assert_eq!(cstr_value(b"\0"), None);
    }

    #[test]
    fn cell_folding_tolerates_both_widths() {
        assert_eq!(fold_cells(&[0x12, 0x34, 0x56, 0x78]), Some(0x1234_5678));
        assert_eq!(
            fold_cells(&[0, 0, 0, 1, 0x12, 0x34, 0x56, 0x78]),
            Some(0x1_1234_5678)
        );
        assert_eq!(fold_cells(&[1, 2]), None);
        assert_eq!(fold_cells(&[]), None);
    }

    #[test]
    fn visitor_sees_depths_and_can_stop() {
        let mut buf = [0u8; 512];
        let mut edit = FdtEdit::create_empty_tree(&mut buf).unwrap();
        let root = edit.path_offset("/").unwrap();
        edit.add_subnode(root, "chosen").unwrap();
        edit.add_subnode(root, "memory@0").unwrap();
        let size = edit.finish().unwrap();

        let fdt = Fdt::from_bytes(&buf[..size]).unwrap();
        let mut seen = 0;
        let stopped = scan(&fdt, |node| {
            seen += 1;
            node.depth == 1
        })
        .unwrap();
        assert!(stopped);
        // The walk ended at the first depth-1 node.
        assert_eq!(seen, 2);

        let mut names = 0;
        let stopped = scan(&fdt, |_| {
            names += 1;
            false
        })
        .unwrap();
        assert!(!stopped);
        assert_eq!(names, 3);
    }
}
