use core::str::from_utf8;

use crate::prelude::*;

use super::tree::{DeviceTree, PropId, PropSource};
use super::DeviceTreeNode;
use crate::error::Result;

/// A handle to a property within a [`DeviceTree`].
///
/// Most desired methods are available through the [`PropReader`] trait.
/// Values of wire properties alias the flattened blob; a synthesized
/// `name` value lives in the tree's arena, which is why the trait is
/// implemented at the tree borrow lifetime.
#[derive(Clone)]
pub struct DeviceTreeProp<'a, 'dt: 'a> {
    tree: &'a DeviceTree<'dt>,
    pub(super) id: PropId,
}

impl<'a, 'dt: 'a> DeviceTreeProp<'a, 'dt> {
    pub(super) fn new(tree: &'a DeviceTree<'dt>, id: PropId) -> Self {
        Self { tree, id }
    }

    #[must_use]
    pub fn id(&self) -> PropId {
        self.id
    }
}

impl<'a, 'dt: 'a> PropReader<'a> for DeviceTreeProp<'a, 'dt> {
    type NodeType = DeviceTreeNode<'a, 'dt>;

    #[inline]
    fn propbuf(&self) -> &'a [u8] {
        match self.tree.prop_rec(self.id).source {
            PropSource::Wire { value, .. } => value,
            PropSource::Name { start, len } => self.tree.arena_slice(start, len),
        }
    }

    fn name(&self) -> Result<&'a str> {
        match self.tree.prop_rec(self.id).source {
            PropSource::Wire { nameoff, .. } => {
                Ok(from_utf8(self.tree.fdt().prop_name(nameoff)?)?)
            }
            PropSource::Name { .. } => Ok("name"),
        }
    }

    fn node(&self) -> DeviceTreeNode<'a, 'dt> {
        DeviceTreeNode::new(self.tree, self.tree.prop_rec(self.id).node)
    }
}
