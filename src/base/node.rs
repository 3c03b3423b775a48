#[cfg(doc)]
use super::*;

use crate::base::iters::{FdtItemIter, FdtNodePropIter};
use crate::error::Result;

/// A handle to a device tree node within the flattened tree.
#[derive(Clone)]
pub struct FdtNode<'a, 'dt: 'a> {
    pub(super) name: Result<&'dt str>,
    /// Byte offset of this node's begin token within the structure block.
    pub(super) offset: usize,
    /// Parked just after the begin token, where the node's properties
    /// start.
    pub(super) parse_iter: FdtItemIter<'a, 'dt>,
}

impl<'a, 'dt: 'a> FdtNode<'a, 'dt> {
    /// Returns the name of the node (including the unit address tag)
    #[inline]
    pub fn name(&'a self) -> Result<&'dt str> {
        self.name
    }

    /// Returns the byte offset of this node within the structure block.
    ///
    /// This is the offset form the lookup helpers and the in-place editor
    /// take to address a node.
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns an iterator over this node's [`FdtProp`]s.
    #[must_use]
    pub fn props(&'a self) -> FdtNodePropIter<'a, 'dt> {
        FdtNodePropIter(self.parse_iter.clone())
    }

    /// Returns the next [`FdtNode`] object with the provided compatible device tree property
    /// or `None` if none exists.
    pub fn find_next_compatible_node(&self, string: &str) -> Result<Option<FdtNode<'a, 'dt>>> {
        self.parse_iter.clone().next_compatible_node(string)
    }
}
