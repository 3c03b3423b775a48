//! Flattened device tree wire format definitions.
//!
//! Layouts and constants follow the v0.3 device tree specification at
//! https://www.devicetree.org/ plus the legacy blob versions (0x10, 0x11)
//! this library is able to read.
#![allow(non_camel_case_types)]

use core::mem::size_of;

use endian_type::types::{u32_be, u64_be};
use num_derive::FromPrimitive;

/// Magic number found in the first header field of every blob.
pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// Oldest blob version this library accepts (v16).
pub const FDT_FIRST_SUPPORTED_VERSION: u32 = 0x10;
/// Newest blob version this library accepts or produces (v17).
pub const FDT_LAST_SUPPORTED_VERSION: u32 = 0x11;

/// Phandles are u32 cells which uniquely identify a node for cross references.
pub type Phandle = u32;

/// Tokens of the structure block.
///
/// Every token is a big-endian u32 aligned to 4 bytes from the start of the
/// structure block.
#[derive(FromPrimitive)]
pub enum FdtTok {
    BeginNode = 0x1,
    EndNode = 0x2,
    Prop = 0x3,
    Nop = 0x4,
    End = 0x9,
}

// As defined by the spec.
#[repr(C)]
pub struct fdt_header {
    pub magic: u32_be,
    pub totalsize: u32_be,
    pub off_dt_struct: u32_be,
    pub off_dt_strings: u32_be,
    pub off_mem_rsvmap: u32_be,
    pub version: u32_be,
    pub last_comp_version: u32_be,
    pub boot_cpuid_phys: u32_be,
    pub size_dt_strings: u32_be,
    pub size_dt_struct: u32_be,
}

#[repr(C)]
pub struct fdt_prop_header {
    pub len: u32_be,
    pub nameoff: u32_be,
}

#[repr(C)]
pub struct fdt_reserve_entry {
    pub address: u64_be,
    pub size: u64_be,
}

// The splice arithmetic in the edit module counts on these sizes.
const_assert_eq!(size_of::<fdt_header>(), 40);
const_assert_eq!(size_of::<fdt_prop_header>(), 8);
const_assert_eq!(size_of::<fdt_reserve_entry>(), 16);
