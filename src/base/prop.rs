use core::str::from_utf8;

use crate::base::iters::FdtItemIter;
use crate::base::FdtNode;
use crate::error::Result;
use crate::prelude::*;

use unsafe_unwrap::UnsafeUnwrap;

/// A handle to an [`FdtNode`]'s device tree property
#[derive(Clone)]
pub struct FdtProp<'a, 'dt: 'a> {
    parent_iter: FdtItemIter<'a, 'dt>,
    propbuf: &'dt [u8],
    nameoff: usize,
}

impl<'r, 'dt: 'r> PropReader<'dt> for FdtProp<'r, 'dt> {
    type NodeType = FdtNode<'r, 'dt>;

    #[inline]
    fn propbuf(&self) -> &'dt [u8] {
        self.propbuf
    }

    /// Returns the property's name, resolved against the string table.
    fn name(&self) -> Result<&'dt str> {
        let bytes = self.parent_iter.fdt.prop_name(self.nameoff)?;
        Ok(from_utf8(bytes)?)
    }

    /// Returns the node which this property is attached to
    #[must_use]
    fn node(&self) -> FdtNode<'r, 'dt> {
        unsafe {
            // Unsafe unwrap okay.
            // We're looking back in the tree - our parent node is behind us.
            self.parent_iter
                .clone()
                .next_node()
                .unsafe_unwrap()
                .unsafe_unwrap()
        }
    }
}

impl<'a, 'dt: 'a> FdtProp<'a, 'dt> {
    pub(super) fn new(
        parent_iter: FdtItemIter<'a, 'dt>,
        propbuf: &'dt [u8],
        nameoff: usize,
    ) -> Self {
        Self {
            parent_iter,
            propbuf,
            nameoff,
        }
    }
}
