use crate::prelude::*;

use crate::base::{FdtNode, FdtProp};

/// An enum which contains either an [`FdtNode`] or an [`FdtProp`]
#[derive(Clone)]
pub enum FdtItem<'a, 'dt: 'a> {
    Node(FdtNode<'a, 'dt>),
    Prop(FdtProp<'a, 'dt>),
}

impl<'a, 'dt: 'a> UnwrappableItem<'dt> for FdtItem<'a, 'dt> {
    type TreeNode = FdtNode<'a, 'dt>;
    type TreeProp = FdtProp<'a, 'dt>;

    #[inline]
    fn node(self) -> Option<Self::TreeNode> {
        match self {
            FdtItem::Node(node) => Some(node),
            _ => None,
        }
    }

    #[inline]
    fn prop(self) -> Option<Self::TreeProp> {
        match self {
            FdtItem::Prop(prop) => Some(prop),
            _ => None,
        }
    }
}
