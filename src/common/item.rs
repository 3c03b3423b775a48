use crate::prelude::*;

/// Either-node-or-property items yielded by tree iterators.
pub trait UnwrappableItem<'dt> {
    type TreeProp: PropReader<'dt>;
    type TreeNode;

    fn node(self) -> Option<Self::TreeNode>;
    fn prop(self) -> Option<Self::TreeProp>;
}
