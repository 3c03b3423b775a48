use crate::prelude::*;

use super::tree::{DeviceTree, NodeId, PropId};
use super::{DeviceTreeItem, DeviceTreeNode, DeviceTreeProp};

/// Iterates a node's siblings, the starting node included.
#[derive(Clone)]
pub struct DeviceTreeNodeSiblingIter<'a, 'dt: 'a> {
    tree: &'a DeviceTree<'dt>,
    next: Option<NodeId>,
}

impl<'a, 'dt: 'a> DeviceTreeNodeSiblingIter<'a, 'dt> {
    pub(super) fn over(tree: &'a DeviceTree<'dt>, start: Option<NodeId>) -> Self {
        Self { tree, next: start }
    }
}

impl<'a, 'dt: 'a> Iterator for DeviceTreeNodeSiblingIter<'a, 'dt> {
    type Item = DeviceTreeNode<'a, 'dt>;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        self.next = self.tree.node_rec(cur).next_sibling;
        Some(DeviceTreeNode::new(self.tree, cur))
    }
}

/// Depth-first iterator over the nodes and properties of a
/// [`DeviceTree`].
#[derive(Clone)]
pub struct DeviceTreeIter<'a, 'dt: 'a> {
    pub tree: &'a DeviceTree<'dt>,
    node: Option<NodeId>,
    prop_idx: u32,
    initial_node_returned: bool,
}

#[derive(Clone)]
pub struct DeviceTreeNodeIter<'a, 'dt: 'a>(pub DeviceTreeIter<'a, 'dt>);
impl<'a, 'dt: 'a> Iterator for DeviceTreeNodeIter<'a, 'dt> {
    type Item = DeviceTreeNode<'a, 'dt>;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_node()
    }
}

#[derive(Clone)]
pub struct DeviceTreePropIter<'a, 'dt: 'a>(pub DeviceTreeIter<'a, 'dt>);
impl<'a, 'dt: 'a> Iterator for DeviceTreePropIter<'a, 'dt> {
    type Item = DeviceTreeProp<'a, 'dt>;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_prop()
    }
}

#[derive(Clone)]
pub struct DeviceTreeNodePropIter<'a, 'dt: 'a>(pub DeviceTreeIter<'a, 'dt>);
impl<'a, 'dt: 'a> Iterator for DeviceTreeNodePropIter<'a, 'dt> {
    type Item = DeviceTreeProp<'a, 'dt>;
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next_node_prop()
    }
}

#[derive(Clone)]
pub struct DeviceTreeCompatibleNodeIter<'s, 'a, 'dt: 'a> {
    pub iter: DeviceTreeIter<'a, 'dt>,
    pub string: &'s str,
}
impl<'s, 'a, 'dt: 'a> Iterator for DeviceTreeCompatibleNodeIter<'s, 'a, 'dt> {
    type Item = DeviceTreeNode<'a, 'dt>;
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next_compatible_node(self.string)
    }
}

impl<'a, 'dt: 'a> DeviceTreeIter<'a, 'dt> {
    pub(super) fn new(tree: &'a DeviceTree<'dt>) -> Self {
        let mut this = Self::from_node(tree.root());
        this.initial_node_returned = false;
        this
    }

    pub fn from_node(node: DeviceTreeNode<'a, 'dt>) -> Self {
        Self {
            tree: node.tree(),
            node: Some(node.id),
            prop_idx: 0,
            initial_node_returned: true,
        }
    }

    pub fn next_item(&mut self) -> Option<DeviceTreeItem<'a, 'dt>> {
        let cur = self.node?;
        if !self.initial_node_returned {
            self.initial_node_returned = true;
            return Some(DeviceTreeItem::Node(DeviceTreeNode::new(self.tree, cur)));
        }

        // A node's properties come first, then its subtree.
        let rec = self.tree.node_rec(cur);
        if self.prop_idx < rec.props_len {
            let prop = DeviceTreeProp::new(self.tree, PropId(rec.props_start + self.prop_idx));
            self.prop_idx += 1;
            return Some(DeviceTreeItem::Prop(prop));
        }

        self.prop_idx = 0;
        self.node = self.tree.next_dfs(cur);
        self.node
            .map(|next| DeviceTreeItem::Node(DeviceTreeNode::new(self.tree, next)))
    }

    pub fn next_prop(&mut self) -> Option<DeviceTreeProp<'a, 'dt>> {
        loop {
            match self.next() {
                Some(item) => {
                    if let Some(prop) = item.prop() {
                        return Some(prop);
                    }
                    // Continue if a new node.
                    continue;
                }
                _ => return None,
            }
        }
    }

    pub fn next_node(&mut self) -> Option<DeviceTreeNode<'a, 'dt>> {
        loop {
            match self.next() {
                Some(item) => {
                    if let Some(node) = item.node() {
                        return Some(node);
                    }
                    // Continue if a new prop.
                    continue;
                }
                _ => return None,
            }
        }
    }

    pub fn next_node_prop(&mut self) -> Option<DeviceTreeProp<'a, 'dt>> {
        match self.next() {
            // Return if a new node or an EOF.
            Some(item) => item.prop(),
            _ => None,
        }
    }

    pub fn next_compatible_node(&mut self, string: &str) -> Option<DeviceTreeNode<'a, 'dt>> {
        while let Some(node) = self.next_node() {
            let mut props = node.props();
            while let Some(prop) = props.next() {
                if prop.name() == Ok("compatible")
                    && prop.strings().any(|s| Ok(s == string)).unwrap_or(false)
                {
                    return Some(node);
                }
            }
        }
        None
    }
}

impl<'a, 'dt: 'a> Iterator for DeviceTreeIter<'a, 'dt> {
    type Item = DeviceTreeItem<'a, 'dt>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item()
    }
}
