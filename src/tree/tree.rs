use core::str::from_utf8;

use alloc::vec::Vec;

use crate::prelude::*;

use super::iters::{
    DeviceTreeCompatibleNodeIter, DeviceTreeIter, DeviceTreeNodeIter, DeviceTreeNodeSiblingIter,
    DeviceTreePropIter,
};
use super::DeviceTreeNode;
use crate::base::parse::{next_token, Token};
use crate::base::Fdt;
use crate::error::{FdtError, Result};
use crate::spec::Phandle;

/// Nesting depth the sizing pass can account for without allocating.
const MAX_DEPTH: usize = 64;

/// Index of a node within a [`DeviceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub(super) u32);

/// Index of a property within a [`DeviceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropId(pub(super) u32);

pub(super) struct TreeNode {
    pub(super) parent: Option<NodeId>,
    pub(super) first_child: Option<NodeId>,
    pub(super) next_sibling: Option<NodeId>,
    /// Only meaningful during construction; kept for O(1) child append.
    last_child: Option<NodeId>,
    /// Full path span within the arena.
    path_start: usize,
    path_len: usize,
    /// The leaf name begins this far into the path span.
    leaf_off: usize,
    /// This node's properties are `props[props_start..][..props_len]`.
    /// The wire format guarantees properties precede children, so each
    /// node's records are contiguous and in stream order.
    pub(super) props_start: u32,
    pub(super) props_len: u32,
    pub(super) phandle: Option<Phandle>,
}

pub(super) enum PropSource<'dt> {
    /// Name offset and value straight off the wire.
    Wire { nameoff: usize, value: &'dt [u8] },
    /// A synthesized `name` value; span within the arena.
    Name { start: usize, len: usize },
}

pub(super) struct TreeProp<'dt> {
    pub(super) node: NodeId,
    pub(super) source: PropSource<'dt>,
}

/// Counts from the sizing pass; the populate pass must land on exactly
/// these.
struct Measured {
    nodes: usize,
    props: usize,
    name_bytes: usize,
}

/// State of the node header currently open during a walk: the length of
/// a synthesized `name` value and whether an explicit one was seen.
struct OpenHeader {
    stripped_len: usize,
    saw_name: bool,
}

fn stripped_len(leaf: &[u8]) -> usize {
    leaf.iter().position(|&b| b == b'@').unwrap_or(leaf.len())
}

fn is_phandle_name(name: &[u8]) -> bool {
    name == b"phandle" || name == b"linux,phandle" || name == b"ibm,phandle"
}

/// An unflattened device tree.
///
/// Nodes and properties live in index-linked vectors; full paths and
/// synthesized name values share one byte arena. Property values alias
/// the flattened blob.
pub struct DeviceTree<'dt> {
    fdt: Fdt<'dt>,
    nodes: Vec<TreeNode>,
    props: Vec<TreeProp<'dt>>,
    arena: Vec<u8>,
}

impl<'dt> DeviceTree<'dt> {
    /// Unflatten `fdt`.
    ///
    /// Fails with [`FdtError::BadStructure`] on any structural defect:
    /// an `EndNode` without an open node, a property outside a node
    /// header, unclosed nodes at the end of the stream, or a missing
    /// root. Node names must be UTF-8 since paths are exposed as `str`.
    pub fn new(fdt: Fdt<'dt>) -> Result<Self> {
        let measured = Self::measure(&fdt)?;
        let mut this = Self {
            fdt,
            nodes: Vec::with_capacity(measured.nodes),
            props: Vec::with_capacity(measured.props),
            arena: Vec::with_capacity(measured.name_bytes),
        };
        this.populate()?;

        // Both passes walked the same stream; disagreement means the
        // sizing logic is wrong, not the input.
        debug_assert_eq!(this.nodes.len(), measured.nodes);
        debug_assert_eq!(this.props.len(), measured.props);
        debug_assert_eq!(this.arena.len(), measured.name_bytes);
        Ok(this)
    }

    /// Walk the token stream and count what the populate pass will
    /// store, validating structure along the way.
    fn measure(fdt: &Fdt<'dt>) -> Result<Measured> {
        let buf = fdt.struct_region();
        let mut off = 0;
        let mut m = Measured {
            nodes: 0,
            props: 0,
            name_bytes: 0,
        };
        let mut path_lens = [0usize; MAX_DEPTH];
        let mut depth = 0usize;
        let mut header: Option<OpenHeader> = None;

        fn close(m: &mut Measured, header: &mut Option<OpenHeader>) {
            if let Some(h) = header.take() {
                if !h.saw_name {
                    m.props += 1;
                    m.name_bytes += h.stripped_len + 1;
                }
            }
        }

        loop {
            match next_token(buf, &mut off)? {
                Some(Token::BeginNode { name }) => {
                    close(&mut m, &mut header);
                    if depth == MAX_DEPTH {
                        return Err(FdtError::BadStructure);
                    }
                    if depth == 0 && m.nodes != 0 {
                        // A second root.
                        return Err(FdtError::BadStructure);
                    }
                    // The root's path is "/" and its leaf name is empty.
                    let (path_len, leaf_len) = if depth == 0 {
                        (1, 0)
                    } else if depth == 1 {
                        (1 + name.len(), name.len())
                    } else {
                        (path_lens[depth - 1] + 1 + name.len(), name.len())
                    };
                    path_lens[depth] = path_len;
                    depth += 1;
                    m.nodes += 1;
                    m.name_bytes += path_len;
                    header = Some(OpenHeader {
                        stripped_len: stripped_len(&name[..leaf_len]),
                        saw_name: false,
                    });
                }
                Some(Token::Prop { nameoff, value: _ }) => {
                    let h = header.as_mut().ok_or(FdtError::BadStructure)?;
                    m.props += 1;
                    if fdt.prop_name(nameoff)? == b"name" {
                        h.saw_name = true;
                    }
                }
                Some(Token::EndNode) => {
                    if depth == 0 {
                        return Err(FdtError::BadStructure);
                    }
                    close(&mut m, &mut header);
                    depth -= 1;
                }
                Some(Token::Nop) => (),
                None => break,
            }
        }
        if depth != 0 || m.nodes == 0 {
            return Err(FdtError::BadStructure);
        }
        Ok(m)
    }

    fn populate(&mut self) -> Result<()> {
        let buf = self.fdt.struct_region();
        let mut off = 0;
        let mut cur: Option<NodeId> = None;
        let mut in_header = false;
        let mut saw_name = false;

        loop {
            match next_token(buf, &mut off)? {
                Some(Token::BeginNode { name }) => {
                    // An open header always belongs to a node.
                    if let (true, Some(id)) = (in_header, cur) {
                        self.close_header(id, saw_name);
                    }
                    if cur.is_none() && !self.nodes.is_empty() {
                        return Err(FdtError::BadStructure);
                    }
                    cur = Some(self.push_node(cur, name)?);
                    in_header = true;
                    saw_name = false;
                }
                Some(Token::Prop { nameoff, value }) => {
                    let id = cur.ok_or(FdtError::BadStructure)?;
                    if !in_header {
                        return Err(FdtError::BadStructure);
                    }
                    let name = self.fdt.prop_name(nameoff)?;
                    if name == b"name" {
                        saw_name = true;
                    }
                    if is_phandle_name(name) && value.len() == 4 {
                        let rec = &mut self.nodes[id.0 as usize];
                        if rec.phandle.is_none() {
                            if let Ok(h) = value.read_be_u32(0) {
                                rec.phandle = Some(h);
                            }
                        }
                    }
                    self.props.push(TreeProp {
                        node: id,
                        source: PropSource::Wire { nameoff, value },
                    });
                }
                Some(Token::EndNode) => {
                    let id = cur.ok_or(FdtError::BadStructure)?;
                    if in_header {
                        self.close_header(id, saw_name);
                        in_header = false;
                    }
                    cur = self.nodes[id.0 as usize].parent;
                }
                Some(Token::Nop) => (),
                None => break,
            }
        }
        if cur.is_some() {
            return Err(FdtError::BadStructure);
        }
        Ok(())
    }

    /// Append a node record with its full path in the arena and link it
    /// under `parent`.
    fn push_node(&mut self, parent: Option<NodeId>, wire_name: &[u8]) -> Result<NodeId> {
        let id = NodeId(self.nodes.len() as u32);
        let path_start = self.arena.len();
        let (path_len, leaf_off) = match parent {
            None => {
                self.arena.push(b'/');
                (1, 1)
            }
            Some(pid) => {
                from_utf8(wire_name)?;
                let prec = &self.nodes[pid.0 as usize];
                let (pstart, plen) = (prec.path_start, prec.path_len);
                for i in pstart..pstart + plen {
                    let b = self.arena[i];
                    self.arena.push(b);
                }
                // The root's path already ends in the separator.
                if plen != 1 {
                    self.arena.push(b'/');
                }
                let leaf_off = self.arena.len() - path_start;
                self.arena.extend_from_slice(wire_name);
                (self.arena.len() - path_start, leaf_off)
            }
        };

        self.nodes.push(TreeNode {
            parent,
            first_child: None,
            next_sibling: None,
            last_child: None,
            path_start,
            path_len,
            leaf_off,
            props_start: self.props.len() as u32,
            props_len: 0,
            phandle: None,
        });

        if let Some(pid) = parent {
            match self.nodes[pid.0 as usize].last_child {
                Some(prev) => self.nodes[prev.0 as usize].next_sibling = Some(id),
                None => self.nodes[pid.0 as usize].first_child = Some(id),
            }
            self.nodes[pid.0 as usize].last_child = Some(id);
        }
        Ok(id)
    }

    /// A node's header ends at its first child or its `EndNode`:
    /// synthesize the `name` property if none was seen and seal the
    /// property run.
    fn close_header(&mut self, id: NodeId, saw_name: bool) {
        if !saw_name {
            let rec = &self.nodes[id.0 as usize];
            let leaf_start = rec.path_start + rec.leaf_off;
            let leaf_end = rec.path_start + rec.path_len;
            let len = stripped_len(&self.arena[leaf_start..leaf_end]);
            let start = self.arena.len();
            for i in leaf_start..leaf_start + len {
                let b = self.arena[i];
                self.arena.push(b);
            }
            self.arena.push(0);
            self.props.push(TreeProp {
                node: id,
                source: PropSource::Name {
                    start,
                    len: len + 1,
                },
            });
        }
        let total = self.props.len() as u32;
        let rec = &mut self.nodes[id.0 as usize];
        rec.props_len = total - rec.props_start;
    }

    /// The flattened blob this tree was built from.
    pub fn fdt(&self) -> &Fdt<'dt> {
        &self.fdt
    }

    /// The root node.
    pub fn root(&self) -> DeviceTreeNode<'_, 'dt> {
        // Construction rejected trees without one.
        DeviceTreeNode::new(self, NodeId(0))
    }

    /// Look a node up by its full path. The root is `"/"`.
    pub fn node(&self, path: &str) -> Option<DeviceTreeNode<'_, 'dt>> {
        self.nodes().find(|n| n.path() == path)
    }

    /// The node carrying phandle `phandle`, if any.
    pub fn find_phandle(&self, phandle: Phandle) -> Option<DeviceTreeNode<'_, 'dt>> {
        let idx = self.nodes.iter().position(|n| n.phandle == Some(phandle))?;
        Some(DeviceTreeNode::new(self, NodeId(idx as u32)))
    }

    /// All nodes in depth-first order.
    #[must_use]
    pub fn nodes(&self) -> DeviceTreeNodeIter<'_, 'dt> {
        DeviceTreeNodeIter(self.items())
    }

    /// All properties in depth-first order.
    #[must_use]
    pub fn props(&self) -> DeviceTreePropIter<'_, 'dt> {
        DeviceTreePropIter(self.items())
    }

    #[must_use]
    pub fn items(&self) -> DeviceTreeIter<'_, 'dt> {
        DeviceTreeIter::new(self)
    }

    /// Direct children of `id`, in insertion order.
    pub fn children(&self, id: NodeId) -> DeviceTreeNodeSiblingIter<'_, 'dt> {
        DeviceTreeNodeSiblingIter::over(self, self.node_rec(id).first_child)
    }

    /// Nodes whose `compatible` list contains `string`.
    pub fn compatible_nodes<'a, 's>(
        &'a self,
        string: &'s str,
    ) -> DeviceTreeCompatibleNodeIter<'s, 'a, 'dt> {
        DeviceTreeCompatibleNodeIter {
            iter: self.items(),
            string,
        }
    }

    pub(super) fn node_rec(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0 as usize]
    }

    pub(super) fn prop_rec(&self, id: PropId) -> &TreeProp<'dt> {
        &self.props[id.0 as usize]
    }

    pub(super) fn arena_slice(&self, start: usize, len: usize) -> &[u8] {
        &self.arena[start..start + len]
    }

    pub(super) fn path_of(&self, id: NodeId) -> &str {
        let rec = self.node_rec(id);
        let bytes = self.arena_slice(rec.path_start, rec.path_len);
        // Arena path bytes were validated as UTF-8 during construction.
        unsafe { core::str::from_utf8_unchecked(bytes) }
    }

    pub(super) fn leaf_of(&self, id: NodeId) -> &str {
        let rec = self.node_rec(id);
        &self.path_of(id)[rec.leaf_off..]
    }

    /// Depth-first successor: first child, else the next sibling of the
    /// nearest ancestor that has one.
    pub(super) fn next_dfs(&self, id: NodeId) -> Option<NodeId> {
        let rec = self.node_rec(id);
        if let Some(child) = rec.first_child {
            return Some(child);
        }
        let mut cur = id;
        loop {
            let rec = self.node_rec(cur);
            if let Some(sibling) = rec.next_sibling {
                return Some(sibling);
            }
            cur = rec.parent?;
        }
    }
}
