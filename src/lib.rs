//! A boot-time flattened device tree toolkit for embedded no-std
//! environments.
//!
//! Firmware hands the kernel its machine description as a flattened
//! device tree blob, or on older boards as an ATAG parameter list. This
//! crate covers everything early boot does with either:
//!
//! * [`base`] parses a blob in place, without allocating: header
//!   validation, token iteration, path and property lookup, and
//!   `compatible` based machine matching.
//! * [`edit`] rewrites a blob inside a mutable buffer: properties and
//!   nodes can be added, resized and removed, and the blob packed back
//!   down for handoff.
//! * [`atag`] reads legacy ATAG lists and folds them into a device tree
//!   so downstream code deals with one format only.
//! * [`memblock`] tracks usable and reserved physical memory ranges
//!   before any allocator exists, growing its own storage out of the
//!   memory it tracks when it must.
//! * [`scan`] extracts the early boot parameters (cell widths, command
//!   line, initrd bounds, memory banks) from the raw token stream and
//!   drives the whole phase end to end.
//! * [`tree`] (requires the `alloc` feature) unflattens a blob into an
//!   index-linked tree for random access queries after boot.
//!
//! The crate is `no_std` by default; the `std` feature (on by default)
//! implies `alloc`.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(clippy::all)]

#[cfg(feature = "std")]
extern crate core;

#[cfg(feature = "alloc")]
extern crate alloc;

extern crate endian_type_rs as endian_type;
#[macro_use]
extern crate static_assertions;

pub mod atag;
pub mod base;
pub mod common;
pub mod edit;
pub mod error;
pub mod memblock;
pub mod prelude;
pub mod scan;
pub mod spec;
#[cfg(feature = "alloc")]
pub mod tree;

mod priv_util;
