//! In-place editing of flattened device trees.
//!
//! # Overview
//!
//! This module rewrites a device tree blob inside a caller supplied
//! mutable buffer, the way boot firmware patches a tree it was handed:
//! no allocation, just one buffer with the tree at its front and free
//! capacity behind it.
//!
//! A tree is opened with [`FdtEdit::open()`] (in place) or
//! [`FdtEdit::open_into()`] (copying from a read-only source), mutated
//! through property and node operations addressed by structure block
//! offsets, then shrunk back to its packed size with [`FdtEdit::pack()`]
//! or [`FdtEdit::finish()`].
//!
//! # Examples
//!
//! ```
//! use bootfdt::base::Fdt;
//! use bootfdt::edit::FdtEdit;
//!
//! fn patch(blob: &[u8]) -> bootfdt::error::Result<usize> {
//!     let fdt = Fdt::from_bytes(blob)?;
//!     let mut buf = [0u8; 4096];
//!     let mut edit = FdtEdit::open_into(&fdt, &mut buf)?;
//!
//!     let root = edit.path_offset("/")?;
//!     let chosen = edit.add_subnode(root, "chosen")?;
//!     edit.setprop_str(chosen, "bootargs", "console=ttyAMA0")?;
//!
//!     edit.finish()
//! }
//! ```

#[doc(hidden)]
pub mod tree;

mod ops;

#[doc(inline)]
pub use tree::*;
