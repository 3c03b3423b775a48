use super::iters::{DeviceTreeIter, DeviceTreeNodePropIter, DeviceTreeNodeSiblingIter};
use super::tree::{DeviceTree, NodeId};
use crate::spec::Phandle;

/// A handle to a node within a [`DeviceTree`].
#[derive(Clone)]
pub struct DeviceTreeNode<'a, 'dt: 'a> {
    tree: &'a DeviceTree<'dt>,
    pub(super) id: NodeId,
}

impl<'a, 'dt: 'a> DeviceTreeNode<'a, 'dt> {
    pub(super) fn new(tree: &'a DeviceTree<'dt>, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub fn tree(&self) -> &'a DeviceTree<'dt> {
        self.tree
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The leaf name, unit address included. Empty for the root.
    pub fn name(&self) -> &'a str {
        self.tree.leaf_of(self.id)
    }

    /// The full path from the root, `"/"` for the root itself.
    pub fn path(&self) -> &'a str {
        self.tree.path_of(self.id)
    }

    /// This node's phandle, captured from `phandle`, `linux,phandle` or
    /// `ibm,phandle`.
    #[must_use]
    pub fn phandle(&self) -> Option<Phandle> {
        self.tree.node_rec(self.id).phandle
    }

    pub fn parent(&self) -> Option<Self> {
        let parent = self.tree.node_rec(self.id).parent?;
        Some(Self::new(self.tree, parent))
    }

    /// Direct children, in insertion order.
    pub fn children(&self) -> DeviceTreeNodeSiblingIter<'a, 'dt> {
        self.tree.children(self.id)
    }

    /// This node and the siblings after it.
    pub fn siblings(&self) -> DeviceTreeNodeSiblingIter<'a, 'dt> {
        DeviceTreeNodeSiblingIter::over(self.tree, Some(self.id))
    }

    /// This node's properties, in stream order.
    pub fn props(&self) -> DeviceTreeNodePropIter<'a, 'dt> {
        DeviceTreeNodePropIter(DeviceTreeIter::from_node(self.clone()))
    }
}
