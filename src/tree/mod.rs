//! An unflattened device tree in crate-owned storage.
//!
//! Utilities in this module operate on a [`DeviceTree`], built once from
//! a flattened blob. Where the parsers in [`crate::base`] re-walk the
//! token stream for every query, a [`DeviceTree`] resolves parents,
//! children and paths from index links in constant time.
//!
//! Construction is two-pass: a sizing pass walks the token stream
//! without allocating and counts nodes, properties and name bytes, then
//! a second pass fills vectors allocated to exactly those counts. A
//! malformed stream fails construction; no partial tree is returned.
//!
//! Every node carries its full path (`/soc/uart@10000000`), with the
//! leaf name available as a subslice. Nodes lacking an explicit `name`
//! property get one synthesized from the leaf name minus its unit
//! address, matching what the flattened form leaves implicit.
//!
//! # Examples
//!
//! ```
//! use bootfdt::base::Fdt;
//! use bootfdt::tree::DeviceTree;
//!
//! fn dump(blob: &[u8]) -> Result<(), bootfdt::error::FdtError> {
//!     let fdt = Fdt::from_bytes(blob)?;
//!     let tree = DeviceTree::new(fdt)?;
//!     for node in tree.nodes() {
//!         // Full paths come straight off the index.
//!         let _ = node.path();
//!     }
//!     Ok(())
//! }
//! ```

#[doc(hidden)]
pub mod item;
#[doc(hidden)]
pub mod node;
#[doc(hidden)]
pub mod prop;
#[doc(hidden)]
pub mod tree;

pub mod iters;

#[doc(inline)]
pub use item::DeviceTreeItem;
#[doc(inline)]
pub use node::DeviceTreeNode;
#[doc(inline)]
pub use prop::DeviceTreeProp;
#[doc(inline)]
pub use tree::{DeviceTree, NodeId, PropId};
