use crate::prelude::*;

use super::{DeviceTreeNode, DeviceTreeProp};

#[derive(Clone)]
pub enum DeviceTreeItem<'a, 'dt: 'a> {
    Node(DeviceTreeNode<'a, 'dt>),
    Prop(DeviceTreeProp<'a, 'dt>),
}

impl<'a, 'dt: 'a> UnwrappableItem<'a> for DeviceTreeItem<'a, 'dt> {
    type TreeNode = DeviceTreeNode<'a, 'dt>;
    type TreeProp = DeviceTreeProp<'a, 'dt>;

    #[inline]
    fn node(self) -> Option<Self::TreeNode> {
        match self {
            DeviceTreeItem::Node(node) => Some(node),
            _ => None,
        }
    }

    #[inline]
    fn prop(self) -> Option<Self::TreeProp> {
        match self {
            DeviceTreeItem::Prop(prop) => Some(prop),
            _ => None,
        }
    }
}
