//! Early boot physical memory region tracking.
//!
//! [`MemBlock`] accumulates the RAM banks the device tree (or ATAG list)
//! describes and the ranges already spoken for, before any general
//! purpose allocator exists. It answers point queries, finds free holes,
//! and hands out one-shot bulk allocations.
//!
//! Each set of regions starts in an inline array and, once that
//! overflows, moves to storage the tracker carves out of the very memory
//! it tracks. The embedder supplies a [`PhysMap`] so a carved physical
//! range can be written through, and optionally a [`BootAlloc`] which
//! takes over growth once a real allocator is up.

use core::alloc::Layout;
use core::cmp::{max, min};
use core::ops::Range;
use core::ptr::NonNull;
use core::slice;

use crate::error::{FdtError, Result};

pub type PhysAddr = u64;

/// Entries each region set can hold before it has to grow.
pub const INIT_REGIONS: usize = 64;

/// Node id of regions not attributed to any device tree node.
pub const NO_NODE: i32 = -1;

/// Free space search direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDir {
    /// Highest fit wins.
    TopDown,
    /// Lowest fit at or above the tracker's floor wins. When nothing
    /// fits above the floor the search falls back to top-down over the
    /// whole range before giving up.
    BottomUp,
}

/// Map physical ranges the tracker manages to pointers it can use.
///
/// Self-hosted storage growth carves the new region array out of tracked
/// free memory; this hook turns that physical range into a writable
/// pointer. The returned pointer must be valid for `len` bytes and at
/// least as aligned as the physical address.
pub trait PhysMap {
    fn phys_to_ptr(&mut self, addr: PhysAddr, len: usize) -> *mut u8;
}

/// A general purpose allocator the tracker prefers over carving, once
/// the embedder has one running.
pub trait BootAlloc {
    fn alloc(&mut self, layout: Layout) -> Option<NonNull<u8>>;
    fn dealloc(&mut self, ptr: NonNull<u8>, layout: Layout);
}

/// Placeholder allocator for trackers running before any exists.
pub struct NoAlloc;

impl BootAlloc for NoAlloc {
    fn alloc(&mut self, _layout: Layout) -> Option<NonNull<u8>> {
        None
    }
    fn dealloc(&mut self, _ptr: NonNull<u8>, _layout: Layout) {}
}

/// One contiguous physical range and the device tree node it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: PhysAddr,
    pub size: u64,
    pub node: i32,
}

impl Region {
    const EMPTY: Region = Region {
        base: 0,
        size: 0,
        node: NO_NODE,
    };

    /// First address past the region.
    pub fn end(&self) -> PhysAddr {
        self.base + self.size
    }
}

enum Backing {
    Alloc(Layout),
    Carved { base: PhysAddr, size: u64 },
}

struct External {
    ptr: *mut Region,
    capacity: usize,
    backing: Backing,
}

/// An ordered, disjoint set of [`Region`]s.
///
/// Entries are kept sorted by base address with no overlap; adjacent
/// entries of the same node id are merged on insert. Mutation happens
/// through [`MemBlock`], which owns the storage growth protocol.
pub struct RegionSet {
    inline: [Region; INIT_REGIONS],
    /// `None` while the inline seed is in use.
    external: Option<External>,
    len: usize,
    total_size: u64,
}

impl RegionSet {
    fn new() -> Self {
        Self {
            inline: [Region::EMPTY; INIT_REGIONS],
            external: None,
            len: 0,
            total_size: 0,
        }
    }

    /// The regions of the set, sorted by base address.
    pub fn regions(&self) -> &[Region] {
        &self.slots()[..self.len]
    }

    /// Number of regions in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sum of all region sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    fn capacity(&self) -> usize {
        match &self.external {
            Some(ext) => ext.capacity,
            None => INIT_REGIONS,
        }
    }

    fn slots(&self) -> &[Region] {
        match &self.external {
            // The pointer and capacity were established by storage
            // growth and every slot has been initialized.
            Some(ext) => unsafe { slice::from_raw_parts(ext.ptr, ext.capacity) },
            None => &self.inline,
        }
    }

    fn slots_mut(&mut self) -> &mut [Region] {
        match &self.external {
            Some(ext) => unsafe { slice::from_raw_parts_mut(ext.ptr, ext.capacity) },
            None => &mut self.inline,
        }
    }

    fn regions_mut(&mut self) -> &mut [Region] {
        let len = self.len;
        &mut self.slots_mut()[..len]
    }

    /// Point query by binary search.
    fn search(&self, addr: PhysAddr) -> Option<usize> {
        use core::cmp::Ordering;
        self.regions()
            .binary_search_by(|r| {
                if addr < r.base {
                    Ordering::Greater
                } else if addr >= r.end() {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()
    }

    fn insert(&mut self, idx: usize, region: Region) {
        debug_assert!(self.len < self.capacity());
        let len = self.len;
        let slots = self.slots_mut();
        slots.copy_within(idx..len, idx + 1);
        slots[idx] = region;
        self.len += 1;
        self.total_size += region.size;
    }

    /// Drop the slot at `idx` without touching `total_size`.
    fn delete_entry(&mut self, idx: usize) {
        let len = self.len;
        self.slots_mut().copy_within(idx + 1..len, idx);
        self.len -= 1;
    }

    fn remove_at(&mut self, idx: usize) {
        self.total_size -= self.regions()[idx].size;
        self.delete_entry(idx);
    }

    /// Split the region at `idx` in two at `addr`, which must fall
    /// strictly inside it. Both halves keep the node id.
    fn split_at(&mut self, idx: usize, addr: PhysAddr) {
        let r = self.regions()[idx];
        debug_assert!(r.base < addr && addr < r.end());
        let tail = r.end() - addr;
        self.regions_mut()[idx].size -= tail;
        self.total_size -= tail;
        self.insert(
            idx + 1,
            Region {
                base: addr,
                size: tail,
                node: r.node,
            },
        );
    }

    /// Merge adjacent entries of the same node id. Strictly
    /// adjacency-based; overlapping entries are a bug upstream.
    fn merge(&mut self) {
        let mut i = 0;
        while i + 1 < self.len {
            let this = self.regions()[i];
            let next = self.regions()[i + 1];
            if this.end() == next.base && this.node == next.node {
                self.regions_mut()[i].size += next.size;
                self.delete_entry(i + 1);
            } else {
                i += 1;
            }
        }
    }

    fn debug_check_overlap(&self) {
        for pair in self.regions().windows(2) {
            debug_assert!(pair[0].end() <= pair[1].base);
        }
    }
}

/// Free slots needed so a range removal can split at both boundaries.
const ISOLATE_SLOTS: usize = 2;

#[derive(Clone, Copy, PartialEq, Eq)]
enum SetKind {
    Memory,
    Reserved,
}

/// Sub-ranges of memory not covered by reserved entries, in address
/// order.
struct FreeRanges<'a> {
    memory: &'a [Region],
    reserved: &'a [Region],
    mi: usize,
    ri: usize,
    cursor: PhysAddr,
}

impl<'a> Iterator for FreeRanges<'a> {
    /// A half-open hole `(start, end)`.
    type Item = (PhysAddr, PhysAddr);

    fn next(&mut self) -> Option<(PhysAddr, PhysAddr)> {
        loop {
            let m = self.memory.get(self.mi)?;
            let m_end = m.end();
            if self.cursor < m.base {
                self.cursor = m.base;
            }
            if self.cursor >= m_end {
                self.mi += 1;
                continue;
            }
            while let Some(r) = self.reserved.get(self.ri) {
                if r.end() <= self.cursor {
                    self.ri += 1;
                } else {
                    break;
                }
            }
            let (hole_end, next_cursor) = match self.reserved.get(self.ri) {
                Some(r) if r.base < m_end => {
                    if r.base <= self.cursor {
                        // Cursor sits inside a reserved block.
                        self.cursor = r.end();
                        continue;
                    }
                    (r.base, r.end())
                }
                _ => (m_end, m_end),
            };
            let start = self.cursor;
            self.cursor = next_cursor;
            return Some((start, hole_end));
        }
    }
}

fn round_up(x: u64, align: u64) -> Option<u64> {
    Some(x.checked_add(align - 1)? & !(align - 1))
}

fn round_down(x: u64, align: u64) -> u64 {
    x & !(align - 1)
}

/// First sub-range of `cursor..end` not covered by `regions`.
fn first_uncovered(
    regions: &[Region],
    mut cursor: PhysAddr,
    end: PhysAddr,
) -> Option<(PhysAddr, PhysAddr)> {
    if cursor >= end {
        return None;
    }
    for r in regions {
        if r.base >= end {
            break;
        }
        if r.end() <= cursor {
            continue;
        }
        if r.base > cursor {
            return Some((cursor, r.base));
        }
        cursor = r.end();
        if cursor >= end {
            return None;
        }
    }
    Some((cursor, end))
}

/// How many entries covering `base..end` would add to `regions`.
fn count_uncovered(regions: &[Region], base: PhysAddr, end: PhysAddr) -> usize {
    let mut new = 0;
    let mut cursor = base;
    while let Some((_, seg_end)) = first_uncovered(regions, cursor, end) {
        new += 1;
        cursor = seg_end;
    }
    new
}

/// A violated ordering invariant, reported by
/// [`MemBlock::check_invariants()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Which set, `"memory"` or `"reserved"`.
    pub set: &'static str,
    /// Index of the offending entry, or `len` for a total size mismatch.
    pub index: usize,
}

fn check_set(name: &'static str, set: &RegionSet) -> core::result::Result<(), InvariantViolation> {
    let mut sum = 0u64;
    for (index, r) in set.regions().iter().enumerate() {
        let overlaps = index > 0 && set.regions()[index - 1].end() > r.base;
        if r.size == 0 || overlaps {
            return Err(InvariantViolation { set: name, index });
        }
        sum += r.size;
    }
    if sum != set.total_size() {
        return Err(InvariantViolation {
            set: name,
            index: set.len(),
        });
    }
    Ok(())
}

/// The early boot memory tracker: known RAM, reserved ranges, and the
/// allocation direction policy.
pub struct MemBlock<P: PhysMap, A: BootAlloc = NoAlloc> {
    memory: RegionSet,
    reserved: RegionSet,
    phys: P,
    alloc: A,
    bottom_up: bool,
    bottom_up_floor: PhysAddr,
}

impl<P: PhysMap> MemBlock<P, NoAlloc> {
    /// An empty tracker with no allocator behind it; storage growth
    /// self-hosts from tracked memory.
    pub fn new(phys: P) -> Self {
        Self::with_alloc(phys, NoAlloc)
    }
}

impl<P: PhysMap, A: BootAlloc> MemBlock<P, A> {
    pub fn with_alloc(phys: P, alloc: A) -> Self {
        Self {
            memory: RegionSet::new(),
            reserved: RegionSet::new(),
            phys,
            alloc,
            bottom_up: false,
            bottom_up_floor: 0,
        }
    }

    /// Known system memory.
    pub fn memory(&self) -> &RegionSet {
        &self.memory
    }

    /// Ranges withheld from allocation.
    pub fn reserved(&self) -> &RegionSet {
        &self.reserved
    }

    /// Bytes of known system memory.
    #[must_use]
    pub fn total_memory(&self) -> u64 {
        self.memory.total_size()
    }

    /// Switch the default search direction to prefer low addresses at
    /// or above `floor`. The floor keeps early allocations clear of the
    /// booting image.
    pub fn set_bottom_up(&mut self, enable: bool, floor: PhysAddr) {
        self.bottom_up = enable;
        self.bottom_up_floor = floor;
    }

    #[must_use]
    pub fn is_bottom_up(&self) -> bool {
        self.bottom_up
    }

    /// The direction searches default to.
    #[must_use]
    pub fn direction(&self) -> SearchDir {
        if self.bottom_up {
            SearchDir::BottomUp
        } else {
            SearchDir::TopDown
        }
    }

    /// Register a bank of system memory attributed to device tree node
    /// `node`. Overlapping registrations coalesce.
    pub fn add(&mut self, base: PhysAddr, size: u64, node: i32) -> Result<()> {
        self.add_range(SetKind::Memory, base, size, node)
    }

    /// Drop `base..base + size` from known memory.
    pub fn remove(&mut self, base: PhysAddr, size: u64) -> Result<()> {
        self.remove_range(SetKind::Memory, base, size)
    }

    /// Withhold `base..base + size` from allocation.
    pub fn reserve(&mut self, base: PhysAddr, size: u64) -> Result<()> {
        self.add_range(SetKind::Reserved, base, size, NO_NODE)
    }

    /// Return a previously reserved range to the free pool.
    pub fn free(&mut self, base: PhysAddr, size: u64) -> Result<()> {
        self.remove_range(SetKind::Reserved, base, size)
    }

    /// Is `addr` inside any known memory region?
    #[must_use]
    pub fn is_memory(&self, addr: PhysAddr) -> bool {
        self.memory.search(addr).is_some()
    }

    /// Is `addr` inside any reserved region?
    #[must_use]
    pub fn is_reserved(&self, addr: PhysAddr) -> bool {
        self.reserved.search(addr).is_some()
    }

    /// Find a free hole of `size` bytes aligned to `align` within
    /// `range`.
    ///
    /// Free means inside known memory and outside every reserved range.
    /// A zero size trivially succeeds at the aligned start of `range`.
    pub fn find_free(
        &self,
        size: u64,
        align: u64,
        range: Range<PhysAddr>,
        dir: SearchDir,
    ) -> Option<PhysAddr> {
        let align = max(align, 1);
        debug_assert!(align.is_power_of_two());
        if size == 0 {
            return round_up(range.start, align);
        }
        if dir == SearchDir::BottomUp {
            if let Some(addr) = self.find_bottom_up(size, align, &range) {
                return Some(addr);
            }
        }
        self.find_top_down(size, align, &range)
    }

    /// One bulk allocation: find a free hole anywhere and reserve it.
    pub fn alloc_range(&mut self, size: u64, align: u64) -> Result<PhysAddr> {
        let addr = self
            .find_free(size, align, 0..PhysAddr::MAX, self.direction())
            .ok_or(FdtError::NoSpace)?;
        self.reserve(addr, size)?;
        Ok(addr)
    }

    /// Verify ordering, disjointness and size accounting of both sets.
    pub fn check_invariants(&self) -> core::result::Result<(), InvariantViolation> {
        check_set("memory", &self.memory)?;
        check_set("reserved", &self.reserved)
    }

    /// Log both region sets at debug level.
    pub fn dump(&self) {
        for r in self.memory.regions() {
            log::debug!("memory   [{:#x}..{:#x}] node {}", r.base, r.end(), r.node);
        }
        for r in self.reserved.regions() {
            log::debug!("reserved [{:#x}..{:#x}] node {}", r.base, r.end(), r.node);
        }
        log::debug!("total memory {:#x}", self.total_memory());
    }

    fn set(&self, kind: SetKind) -> &RegionSet {
        match kind {
            SetKind::Memory => &self.memory,
            SetKind::Reserved => &self.reserved,
        }
    }

    fn set_mut(&mut self, kind: SetKind) -> &mut RegionSet {
        match kind {
            SetKind::Memory => &mut self.memory,
            SetKind::Reserved => &mut self.reserved,
        }
    }

    fn free_ranges(&self) -> FreeRanges<'_> {
        FreeRanges {
            memory: self.memory.regions(),
            reserved: self.reserved.regions(),
            mi: 0,
            ri: 0,
            cursor: 0,
        }
    }

    fn find_top_down(&self, size: u64, align: u64, range: &Range<PhysAddr>) -> Option<PhysAddr> {
        let mut best = None;
        for (hole_start, hole_end) in self.free_ranges() {
            let start = max(hole_start, range.start);
            let end = min(hole_end, range.end);
            if start >= end || end - start < size {
                continue;
            }
            let cand = round_down(end - size, align);
            if cand >= start {
                best = Some(match best {
                    Some(b) => max(b, cand),
                    None => cand,
                });
            }
        }
        best
    }

    fn find_bottom_up(&self, size: u64, align: u64, range: &Range<PhysAddr>) -> Option<PhysAddr> {
        let floor = max(range.start, self.bottom_up_floor);
        for (hole_start, hole_end) in self.free_ranges() {
            let start = max(hole_start, floor);
            let end = min(hole_end, range.end);
            if start >= end {
                continue;
            }
            let cand = match round_up(start, align) {
                Some(c) => c,
                None => continue,
            };
            if cand < end && end - cand >= size {
                return Some(cand);
            }
        }
        None
    }

    fn add_range(&mut self, kind: SetKind, base: PhysAddr, size: u64, node: i32) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let end = base.saturating_add(size);
        loop {
            let new = count_uncovered(self.set(kind).regions(), base, end);
            if new == 0 {
                return Ok(());
            }
            if self.set(kind).len + new <= self.set(kind).capacity() {
                let set = self.set_mut(kind);
                let mut cursor = base;
                while let Some((seg_start, seg_end)) = first_uncovered(set.regions(), cursor, end) {
                    let idx = set.regions().partition_point(|r| r.base < seg_start);
                    set.insert(
                        idx,
                        Region {
                            base: seg_start,
                            size: seg_end - seg_start,
                            node,
                        },
                    );
                    cursor = seg_end;
                }
                set.merge();
                set.debug_check_overlap();
                return Ok(());
            }
            // Growing may insert a carve reservation, so the loop
            // recounts against the updated set.
            self.grow(kind, base, size)?;
        }
    }

    fn remove_range(&mut self, kind: SetKind, base: PhysAddr, size: u64) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let (start_idx, end_idx) = self.isolate(kind, base, size)?;
        let set = self.set_mut(kind);
        for idx in (start_idx..end_idx).rev() {
            set.remove_at(idx);
        }
        Ok(())
    }

    /// Split boundary-straddling entries so `base..base + size` is
    /// covered by whole entries only, and return their index range.
    fn isolate(&mut self, kind: SetKind, base: PhysAddr, size: u64) -> Result<(usize, usize)> {
        let end = base.saturating_add(size);
        self.ensure_free_slots(kind, ISOLATE_SLOTS, base, size)?;

        let set = self.set_mut(kind);
        let mut start_idx = 0;
        let mut end_idx = 0;
        let mut idx = 0;
        while idx < set.len {
            let r = set.regions()[idx];
            if r.base >= end {
                break;
            }
            if r.end() <= base {
                idx += 1;
                continue;
            }
            if r.base < base {
                set.split_at(idx, base);
                // Revisit the tail half next round.
                idx += 1;
                continue;
            }
            if r.end() > end {
                set.split_at(idx, end);
                // The head half is now fully contained; re-examine it.
                continue;
            }
            if end_idx == 0 {
                start_idx = idx;
            }
            end_idx = idx + 1;
            idx += 1;
        }
        Ok((start_idx, end_idx))
    }

    fn ensure_free_slots(
        &mut self,
        kind: SetKind,
        need: usize,
        ex_base: PhysAddr,
        ex_size: u64,
    ) -> Result<()> {
        while self.set(kind).len + need > self.set(kind).capacity() {
            self.grow(kind, ex_base, ex_size)?;
        }
        Ok(())
    }

    /// Double a set's storage.
    ///
    /// Prefers the embedder's allocator; otherwise carves the new array
    /// out of tracked free space, excluding `ex_base..ex_base + ex_size`
    /// when the reserved set itself is growing (that range is mid
    /// insertion and must not be handed out). The prior entries survive
    /// unchanged on failure.
    fn grow(&mut self, kind: SetKind, ex_base: PhysAddr, ex_size: u64) -> Result<()> {
        let new_cap = self.set(kind).capacity() * 2;
        let layout = Layout::array::<Region>(new_cap).or(Err(FdtError::NoSpace))?;

        if let Some(ptr) = self.alloc.alloc(layout) {
            let old = self.swap_storage(kind, ptr.as_ptr() as *mut Region, new_cap, Backing::Alloc(layout));
            self.release(old);
            return Ok(());
        }

        let bytes = layout.size() as u64;
        let align = layout.align() as u64;
        let dir = self.direction();
        let addr = if kind == SetKind::Reserved && ex_size != 0 {
            self.find_free(bytes, align, ex_base.saturating_add(ex_size)..PhysAddr::MAX, dir)
                .or_else(|| self.find_free(bytes, align, 0..ex_base, dir))
        } else {
            self.find_free(bytes, align, 0..PhysAddr::MAX, dir)
        };
        let addr = addr.ok_or(FdtError::NoSpace)?;
        let ptr = self.phys.phys_to_ptr(addr, layout.size()) as *mut Region;
        let old = self.swap_storage(kind, ptr, new_cap, Backing::Carved { base: addr, size: bytes });

        // The carve becomes a reservation only once the grown set is
        // consistent again; the doubled capacity guarantees this cannot
        // grow the same set a second time.
        self.reserve(addr, bytes)?;
        self.release(old);
        Ok(())
    }

    /// Move a set's entries into the new array and install it, handing
    /// back the displaced storage.
    fn swap_storage(
        &mut self,
        kind: SetKind,
        ptr: *mut Region,
        capacity: usize,
        backing: Backing,
    ) -> Option<External> {
        let set = self.set_mut(kind);
        // The new array does not overlap the old one: allocator memory
        // is fresh and a carve comes from free space.
        unsafe {
            for i in 0..capacity {
                ptr.add(i).write(Region::EMPTY);
            }
            slice::from_raw_parts_mut(ptr, set.len).copy_from_slice(set.regions());
        }
        set.external.replace(External {
            ptr,
            capacity,
            backing,
        })
    }

    fn release(&mut self, old: Option<External>) {
        match old {
            Some(External {
                ptr,
                backing: Backing::Alloc(layout),
                ..
            }) => {
                if let Some(ptr) = NonNull::new(ptr as *mut u8) {
                    self.alloc.dealloc(ptr, layout);
                }
            }
            Some(External {
                backing: Backing::Carved { base, size },
                ..
            }) => {
                if self.free(base, size).is_err() {
                    log::debug!("leaking old region array at {:#x}..{:#x}", base, base + size);
                }
            }
            None => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Identity map that refuses to be used; plenty for tests that stay
    /// within the inline seed.
    struct NoMap;
    impl PhysMap for NoMap {
        fn phys_to_ptr(&mut self, _addr: PhysAddr, _len: usize) -> *mut u8 {
            unreachable!("test should not grow storage");
        }
    }

    fn tracker() -> MemBlock<NoMap> {
        MemBlock::new(NoMap)
    }

    #[test]
    fn adjacent_same_node_banks_merge() {
        let mut mb = tracker();
        mb.add(0x1000, 0x1000, 0).unwrap();
        mb.add(0x2000, 0x1000, 0).unwrap();
        assert_eq!(mb.memory().regions().len(), 1);
        assert_eq!(mb.total_memory(), 0x2000);

        // A different node id blocks the merge.
        mb.add(0x3000, 0x1000, 1).unwrap();
        assert_eq!(mb.memory().regions().len(), 2);
        mb.check_invariants().unwrap();
    }

    #[test]
    fn overlapping_add_coalesces() {
        let mut mb = tracker();
        mb.add(0x1000, 0x2000, 0).unwrap();
        mb.add(0x2000, 0x2000, 0).unwrap();
        assert_eq!(
            mb.memory().regions(),
            &[Region {
                base: 0x1000,
                size: 0x3000,
                node: 0
            }]
        );
        assert_eq!(mb.total_memory(), 0x3000);
        mb.check_invariants().unwrap();
    }

    #[test]
    fn remove_splits_straddling_entries() {
        let mut mb = tracker();
        mb.add(0x0, 0x10000, 0).unwrap();
        mb.remove(0x4000, 0x2000).unwrap();
        assert_eq!(
            mb.memory().regions(),
            &[
                Region {
                    base: 0x0,
                    size: 0x4000,
                    node: 0
                },
                Region {
                    base: 0x6000,
                    size: 0xa000,
                    node: 0
                },
            ]
        );
        assert_eq!(mb.total_memory(), 0xe000);
        mb.check_invariants().unwrap();
    }

    #[test]
    fn zero_size_requests_are_noops() {
        let mut mb = tracker();
        mb.add(0x1000, 0, 0).unwrap();
        mb.remove(0x1000, 0).unwrap();
        assert!(mb.memory().is_empty());
        assert_eq!(
            mb.find_free(0, 8, 0x1001..0x2000, SearchDir::TopDown),
            Some(0x1008)
        );
    }

    #[test]
    fn point_queries_use_both_sets() {
        let mut mb = tracker();
        mb.add(0x8000_0000, 0x1000_0000, 0).unwrap();
        mb.reserve(0x8010_0000, 0x1000).unwrap();
        assert!(mb.is_memory(0x8000_0000));
        assert!(mb.is_memory(0x8fff_ffff));
        assert!(!mb.is_memory(0x9000_0000));
        assert!(mb.is_reserved(0x8010_0fff));
        assert!(!mb.is_reserved(0x8010_1000));
    }

    #[test]
    fn find_free_skips_reserved_and_prefers_top() {
        let mut mb = tracker();
        mb.add(0x1000, 0xf000, 0).unwrap();
        mb.reserve(0x8000, 0x8000).unwrap();
        // Only the hole below the reservation remains.
        assert_eq!(
            mb.find_free(0x1000, 0x1000, 0..u64::MAX, SearchDir::TopDown),
            Some(0x7000)
        );

        mb.free(0x8000, 0x8000).unwrap();
        // Topmost fit wins.
        assert_eq!(
            mb.find_free(0x1000, 0x1000, 0..u64::MAX, SearchDir::TopDown),
            Some(0xf000)
        );
    }

    #[test]
    fn bottom_up_starts_at_the_floor() {
        let mut mb = tracker();
        mb.add(0x1000, 0xf000, 0).unwrap();
        mb.set_bottom_up(true, 0x4000);
        assert_eq!(
            mb.find_free(0x1000, 0x1000, 0..u64::MAX, mb.direction()),
            Some(0x4000)
        );
    }

    #[test]
    fn bottom_up_falls_back_to_top_down() {
        let mut mb = tracker();
        mb.add(0x1000, 0xf000, 0).unwrap();
        // All memory sits below the floor, so the bottom-up pass finds
        // nothing and the fallback hands out the topmost fit.
        mb.set_bottom_up(true, 0x10_0000);
        assert_eq!(
            mb.find_free(0x1000, 0x1000, 0..u64::MAX, mb.direction()),
            Some(0xf000)
        );
    }

    #[test]
    fn alloc_range_reserves_what_it_finds() {
        let mut mb = tracker();
        mb.add(0x1000, 0xf000, 0).unwrap();
        let addr = mb.alloc_range(0x2000, 0x1000).unwrap();
        assert_eq!(addr, 0xe000);
        assert!(mb.is_reserved(addr));
        assert!(mb.is_reserved(addr + 0x1fff));
        mb.check_invariants().unwrap();
    }
}
