//! Legacy ATAG boot parameter lists and their conversion to a device
//! tree.
//!
//! Old boot firmware describes the machine with a tagged list of native
//! endian words instead of a flattened device tree. [`AtagList`] reads
//! such a list in place and [`atags_to_fdt()`] folds its contents into a
//! tree held in a scratch buffer, so the rest of boot only ever deals
//! with one format.

use core::mem::{align_of, size_of};
use core::slice;

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use crate::base::lookup;
use crate::edit::FdtEdit;
use crate::error::{FdtError, Result};
use crate::spec::FDT_MAGIC;

pub const ATAG_NONE: u32 = 0x0000_0000;
pub const ATAG_CORE: u32 = 0x5441_0001;
pub const ATAG_MEM: u32 = 0x5441_0002;
pub const ATAG_VIDEOTEXT: u32 = 0x5441_0003;
pub const ATAG_RAMDISK: u32 = 0x5441_0004;
pub const ATAG_INITRD2: u32 = 0x5442_0005;
pub const ATAG_SERIAL: u32 = 0x5441_0006;
pub const ATAG_REVISION: u32 = 0x5441_0007;
pub const ATAG_VIDEOLFB: u32 = 0x5441_0008;
pub const ATAG_CMDLINE: u32 = 0x5441_0009;

/// Longest kernel command line the bridge will assemble, terminator
/// included.
pub const COMMAND_LINE_SIZE: usize = 1024;

/// Most memory banks the bridge will carry over into `/memory`.
pub const MAX_BANKS: usize = 8;

/// Payload of the full 5 word `ATAG_CORE` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreTag {
    pub flags: u32,
    pub pagesize: u32,
    pub rootdev: u32,
}

/// One decoded ATAG record.
///
/// Records the bridge has no use for, malformed payloads, and tag values
/// this module does not know are all carried as [`Atag::Unknown`] so
/// iteration never stalls on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atag<'a> {
    /// The mandatory list opener; `None` for the bare 2 word form.
    Core(Option<CoreTag>),
    /// One bank of system memory.
    Mem { size: u32, start: u32 },
    /// Kernel command line, NUL stripped.
    Cmdline(&'a str),
    /// Physical placement of the compressed initramfs.
    Initrd2 { start: u32, size: u32 },
    /// Board serial number, split across two words.
    Serial { low: u32, high: u32 },
    /// Board revision number.
    Revision(u32),
    /// VGA text mode description, kept as raw payload words.
    VideoText(&'a [u32]),
    Unknown { tag: u32, words: &'a [u32] },
}

/// Convert an ATAG payload to the bytes it occupies in memory.
fn payload_bytes(p: &[u32]) -> &[u8] {
    // A u32 slice is trivially viewable as the bytes backing it.
    unsafe { slice::from_raw_parts(p.as_ptr() as *const u8, p.len() * size_of::<u32>()) }
}

fn cmdline_str(p: &[u32]) -> Option<&str> {
    let bytes = payload_bytes(p);
    let text = match bytes.iter().position(|&b| b == 0) {
        Some(nul) => &bytes[..nul],
        None => bytes,
    };
    core::str::from_utf8(text).ok()
}

fn decode(tag: u32, p: &[u32]) -> Atag<'_> {
    match tag {
        ATAG_CORE => Atag::Core(if p.len() >= 3 {
            Some(CoreTag {
                flags: p[0],
                pagesize: p[1],
                rootdev: p[2],
            })
        } else {
            None
        }),
        ATAG_MEM if p.len() >= 2 => Atag::Mem {
            size: p[0],
            start: p[1],
        },
        ATAG_INITRD2 if p.len() >= 2 => Atag::Initrd2 {
            start: p[0],
            size: p[1],
        },
        ATAG_SERIAL if p.len() >= 2 => Atag::Serial {
            low: p[0],
            high: p[1],
        },
        ATAG_REVISION if !p.is_empty() => Atag::Revision(p[0]),
        ATAG_VIDEOTEXT => Atag::VideoText(p),
        ATAG_CMDLINE => match cmdline_str(p) {
            Some(s) => Atag::Cmdline(s),
            None => Atag::Unknown { tag, words: p },
        },
        _ => Atag::Unknown { tag, words: p },
    }
}

/// A validated view of an ATAG list.
///
/// The list lives in borrowed memory as native endian words; each record
/// is a `{size, tag}` header followed by `size - 2` payload words, and a
/// zero size header terminates the list.
#[derive(Debug, Clone, Copy)]
pub struct AtagList<'a> {
    words: &'a [u32],
}

impl<'a> AtagList<'a> {
    /// Take ownership of a word slice as an ATAG list.
    ///
    /// The list must open with an `ATAG_CORE` record in either its full
    /// 5 word or bare 2 word form, anything else fails with
    /// [`FdtError::BadAtagList`].
    pub fn new(words: &'a [u32]) -> Result<Self> {
        let size = *words.first().ok_or(FdtError::BadAtagList)? as usize;
        if words.len() < 2 || words[1] != ATAG_CORE || (size != 5 && size != 2) {
            return Err(FdtError::BadAtagList);
        }
        Ok(Self { words })
    }

    /// Read an ATAG list out of raw memory.
    ///
    /// Fails with [`FdtError::BadAtagList`] when `bytes` is not word
    /// aligned; trailing bytes short of a whole word are ignored.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        if bytes.as_ptr() as usize % align_of::<u32>() != 0 {
            return Err(FdtError::BadAtagList);
        }
        // Alignment was just checked and any bit pattern is a valid u32.
        let words = unsafe {
            slice::from_raw_parts(bytes.as_ptr() as *const u32, bytes.len() / size_of::<u32>())
        };
        Self::new(words)
    }

    /// Iterate over the records of the list.
    pub fn iter(&self) -> AtagIter<'a> {
        AtagIter { words: self.words }
    }

    /// The raw words backing the list.
    #[must_use]
    pub fn words(&self) -> &'a [u32] {
        self.words
    }
}

/// An iterator over the records of an [`AtagList`].
///
/// Ends at the zero sized terminator header. A record whose size field
/// would run past the end of the list ends iteration as well.
#[derive(Clone)]
pub struct AtagIter<'a> {
    words: &'a [u32],
}

impl<'a> Iterator for AtagIter<'a> {
    type Item = Atag<'a>;

    fn next(&mut self) -> Option<Atag<'a>> {
        let size = *self.words.first()? as usize;
        if size < 2 || size > self.words.len() {
            return None;
        }
        let tag = self.words[1];
        let payload = &self.words[2..size];
        self.words = &self.words[size..];
        Some(decode(tag, payload))
    }
}

/// What [`atags_to_fdt()`] does with an `ATAG_CMDLINE` record when the
/// tree already carries `/chosen/bootargs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdlinePolicy {
    /// Overwrite the tree's command line with the tagged one.
    Replace,
    /// Append the tagged command line to the tree's, so its parameters
    /// win when both set the same one.
    Extend,
}

#[derive(Clone, Copy)]
struct MemBank {
    start: u32,
    size: u32,
}

/// Find `path` directly under the root, adding the node when missing.
fn node_offset(edit: &mut FdtEdit, path: &str) -> Result<usize> {
    match edit.path_offset(path) {
        Ok(offset) => Ok(offset),
        Err(FdtError::NotFound) => {
            let root = edit.path_offset("/")?;
            edit.add_subnode(root, &path[1..])
        }
        Err(e) => Err(e),
    }
}

/// Cells per size value, from the root's `#size-cells`. Trees that leave
/// it unset or use a width other than two get one cell.
fn size_cells(edit: &FdtEdit) -> usize {
    let fdt = edit.as_fdt();
    let cells = lookup::root_offset(&fdt)
        .and_then(|root| lookup::property_u32(&fdt, root, "#size-cells"))
        .unwrap_or(1);
    if cells == 2 {
        2
    } else {
        1
    }
}

fn hex_str(out: &mut [u8], mut value: u32) {
    for byte in out.iter_mut() {
        let digit = (value >> 28) as u8;
        value <<= 4;
        *byte = if digit >= 10 {
            b'a' + digit - 10
        } else {
            b'0' + digit
        };
    }
}

/// Append `extra` to the tree's `/chosen/bootargs`, separated by a
/// space. The merged line is clamped to [`COMMAND_LINE_SIZE`]; an
/// `extra` that would not fit is dropped rather than truncated.
fn merge_bootargs(edit: &mut FdtEdit, extra: &[u8]) -> Result<()> {
    let mut cmdline = [0u8; COMMAND_LINE_SIZE];
    let mut used = 0usize;

    {
        let fdt = edit.as_fdt();
        if let Ok(chosen) = lookup::path_offset(&fdt, "/chosen") {
            if let Ok(existing) = lookup::property(&fdt, chosen, "bootargs") {
                if existing.len() < COMMAND_LINE_SIZE - 1 {
                    let text = match existing.iter().position(|&b| b == 0) {
                        Some(nul) => &existing[..nul],
                        None => existing,
                    };
                    cmdline[..text.len()].copy_from_slice(text);
                    used = text.len();
                }
            }
        }
    }

    if !extra.is_empty() && used + extra.len() + 2 < COMMAND_LINE_SIZE {
        if used > 0 {
            cmdline[used] = b' ';
            used += 1;
        }
        cmdline[used..used + extra.len()].copy_from_slice(extra);
        used += extra.len();
    }

    let chosen = node_offset(edit, "/chosen")?;
    edit.setprop(chosen, "bootargs", &cmdline[..used + 1])
}

/// Fold an ATAG list into the device tree at the front of `buf`.
///
/// `buf` must already hold a valid tree (an empty one from
/// [`FdtEdit::create_empty_tree()`] will do); the whole buffer serves as
/// growing room and the tree is packed again before returning. When
/// `atags` opens with the FDT magic instead of a tag header the firmware
/// handed over a tree already and this is a no-op.
///
/// Carried over:
/// * `ATAG_CMDLINE` to `/chosen/bootargs`, per `policy`
/// * `ATAG_MEM` banks to `/memory/reg`, encoded per the root's
///   `#size-cells`; empty banks are skipped and at most [`MAX_BANKS`]
///   are kept
/// * `ATAG_INITRD2` to `/chosen/linux,initrd-start` and `-end`
/// * `ATAG_SERIAL` to `serial-number` on the root, as 16 hex digits
/// * `ATAG_REVISION` to `linux,revision` on the root
pub fn atags_to_fdt(atags: &[u32], buf: &mut [u8], policy: CmdlinePolicy) -> Result<()> {
    if atags.first() == Some(&FDT_MAGIC.to_be()) {
        return Ok(());
    }
    let list = AtagList::new(atags)?;
    let mut edit = FdtEdit::open(buf)?;

    let mut banks = [MemBank { start: 0, size: 0 }; MAX_BANKS];
    let mut bank_count = 0usize;

    for tag in list.iter() {
        match tag {
            Atag::Cmdline(cmdline) => match policy {
                CmdlinePolicy::Extend => merge_bootargs(&mut edit, cmdline.as_bytes())?,
                CmdlinePolicy::Replace => {
                    let chosen = node_offset(&mut edit, "/chosen")?;
                    edit.setprop_str(chosen, "bootargs", cmdline)?;
                }
            },
            Atag::Mem { size, start } => {
                if size == 0 || bank_count >= MAX_BANKS {
                    continue;
                }
                banks[bank_count] = MemBank { start, size };
                bank_count += 1;
            }
            Atag::Initrd2 { start, size } => {
                let chosen = node_offset(&mut edit, "/chosen")?;
                edit.setprop_u32(chosen, "linux,initrd-start", start)?;
                edit.setprop_u32(chosen, "linux,initrd-end", start.wrapping_add(size))?;
            }
            Atag::Serial { low, high } => {
                let mut serno = [0u8; 17];
                hex_str(&mut serno[0..8], high);
                hex_str(&mut serno[8..16], low);
                let root = edit.path_offset("/")?;
                edit.setprop(root, "serial-number", &serno)?;
            }
            Atag::Revision(rev) => {
                let root = edit.path_offset("/")?;
                edit.setprop_u32(root, "linux,revision", rev)?;
            }
            _ => (),
        }
    }

    if bank_count > 0 {
        let cells = size_cells(&edit);
        let memory = node_offset(&mut edit, "/memory")?;
        // The memory scanner keys on device_type, not the node name.
        edit.setprop(memory, "device_type", b"memory\0")?;
        let reg = edit.setprop_placeholder(memory, "reg", 4 * cells * 2 * bank_count)?;
        let mut off = 0;
        for bank in &banks[..bank_count] {
            if cells == 2 {
                reg[off..off + 8].copy_from_slice(&u64::from(bank.start).to_be_bytes());
                reg[off + 8..off + 16].copy_from_slice(&u64::from(bank.size).to_be_bytes());
                off += 16;
            } else {
                reg[off..off + 4].copy_from_slice(&bank.start.to_be_bytes());
                reg[off + 4..off + 8].copy_from_slice(&bank.size.to_be_bytes());
                off += 8;
            }
        }
    }

    edit.pack()
}

/// The built-in fallback parameter list: one memory bank of `mem_size`
/// bytes at physical address zero and nothing else. Used when firmware
/// hands over neither a device tree nor an ATAG list.
pub fn default_tags(mem_size: u32) -> [u32; 11] {
    [
        5,
        ATAG_CORE,
        1,      // flags: read-only root
        0x1000, // pagesize
        0xff,   // rootdev
        4,
        ATAG_MEM,
        mem_size,
        0,
        0,
        ATAG_NONE,
    ]
}

/// [`default_tags()`] with an `ATAG_CMDLINE` record appended.
#[cfg(feature = "alloc")]
pub fn default_tags_with_cmdline(mem_size: u32, cmdline: &str) -> Vec<u32> {
    let base = default_tags(mem_size);
    let mut words = Vec::new();
    // Everything up to the terminator header.
    words.extend_from_slice(&base[..base.len() - 2]);

    let bytes = cmdline.as_bytes();
    let payload_words = (bytes.len() + 1 + 3) / 4;
    words.push((2 + payload_words) as u32);
    words.push(ATAG_CMDLINE);
    let start = words.len();
    words.resize(start + payload_words, 0);
    for (i, chunk) in bytes.chunks(4).enumerate() {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        words[start + i] = u32::from_ne_bytes(word);
    }

    words.push(0);
    words.push(ATAG_NONE);
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_str_renders_lowercase_nibbles() {
        let mut out = [0u8; 8];
        hex_str(&mut out, 0xdeadbeef);
        assert_eq!(&out, b"deadbeef");
        hex_str(&mut out, 0x0000_0001);
        assert_eq!(&out, b"00000001");
    }

    #[test]
    fn list_must_open_with_core() {
        assert_eq!(
            AtagList::new(&[4, ATAG_MEM, 0x1000, 0]).unwrap_err(),
            FdtError::BadAtagList
        );
        assert_eq!(AtagList::new(&[]).unwrap_err(), FdtError::BadAtagList);
        // Bare 2 word CORE is enough.
        assert!(AtagList::new(&[2, ATAG_CORE, 0, ATAG_NONE]).is_ok());
    }

    #[test]
    fn iteration_stops_at_terminator_and_overruns() {
        let words = [2, ATAG_CORE, 3, ATAG_REVISION, 7, 0, ATAG_NONE, 99];
        let list = AtagList::new(&words).unwrap();
        let tags: [Option<Atag>; 3] = {
            let mut iter = list.iter();
            [iter.next(), iter.next(), iter.next()]
        };
        assert_eq!(tags[0], Some(Atag::Core(None)));
        assert_eq!(tags[1], Some(Atag::Revision(7)));
        assert_eq!(tags[2], None);

        // A size field past the end of the list stops cleanly.
        let words = [2, ATAG_CORE, 600, ATAG_MEM];
        let list = AtagList::new(&words).unwrap();
        assert_eq!(list.iter().count(), 1);
    }

    #[test]
    fn default_tag_list_shape() {
        let words = default_tags(0x0800_0000);
        let list = AtagList::new(&words).unwrap();
        let mut iter = list.iter();
        assert!(matches!(iter.next(), Some(Atag::Core(Some(_)))));
        assert_eq!(
            iter.next(),
            Some(Atag::Mem {
                size: 0x0800_0000,
                start: 0
            })
        );
        assert_eq!(iter.next(), None);
    }
}
