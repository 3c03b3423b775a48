//! Basic device tree parsing utils that operate directly on the FDT.
//!
//! # Overview
//!
//! This module provides basic utilities which can operate on a FDT through in-order parsing.
//! These utilities will simply parse the device tree on the fly.
//!
//! See the [`crate::tree`] module for an unflattened, random access form
//! of the same data.
//!
//! # Examples
//!
//! ## Initialization
//!
//! ```
//! use bootfdt::prelude::*;
//! use bootfdt::base::*;
//!
//! fn parse(buf: &[u8]) -> bootfdt::error::Result<()> {
//!     // Create the device tree parser
//!     let fdt = Fdt::from_bytes(buf)?;
//!     let mut nodes = fdt.nodes();
//!     while let Some(node) = nodes.next()? {
//!         let _ = node.name()?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Compatible Search
//!
//! Find all [`FdtNode`] objects which have their `compatible` property defined as
//! `"ns16550a"`:
//! ```
//! # use bootfdt::prelude::*;
//! # use bootfdt::base::*;
//! # fn search(fdt: &Fdt) -> bootfdt::error::Result<()> {
//! // Get the compatible node iterator
//! let mut iter = fdt.compatible_nodes("ns16550a");
//!
//! // Iterate through all matching nodes
//! while let Some(node) = iter.next()? {
//!     let _ = node.name()?;
//! }
//! # Ok(())
//! # }
//! ```

#[doc(hidden)]
pub mod fdt;
#[doc(hidden)]
pub mod item;
#[doc(hidden)]
pub mod lookup;
#[doc(hidden)]
pub mod node;
#[doc(hidden)]
pub mod prop;

pub mod iters;
pub mod parse;

#[doc(inline)]
pub use fdt::*;
#[doc(inline)]
pub use item::*;
#[doc(inline)]
pub use lookup::*;
#[doc(inline)]
pub use node::*;
#[doc(inline)]
pub use prop::*;
