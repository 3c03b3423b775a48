//! Iterative parsers of an [`Fdt`].
use core::mem::size_of;
use core::str::from_utf8;

use memoffset::offset_of;

use crate::prelude::*;

use crate::base::parse::{next_token, Token};
use crate::base::{Fdt, FdtItem, FdtNode, FdtProp};
use crate::error::{FdtError, Result};
use crate::priv_util::SliceRead;
use crate::spec::fdt_reserve_entry;

use fallible_iterator::FallibleIterator;

/// One entry of the memory reservation table, decoded to native byte
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveEntry {
    pub address: u64,
    pub size: u64,
}

/// An iterator over the memory reservation table of the FDT.
///
/// Ends at the zero-sized terminator entry. A table that runs off the end
/// of the blob ends iteration as well.
#[derive(Clone)]
pub struct ReserveEntryIter<'a, 'dt: 'a> {
    offset: usize,
    fdt: &'a Fdt<'dt>,
}

impl<'a, 'dt: 'a> ReserveEntryIter<'a, 'dt> {
    pub(crate) fn new(fdt: &'a Fdt<'dt>) -> Self {
        Self {
            offset: fdt.off_mem_rsvmap(),
            fdt,
        }
    }
}

impl<'a, 'dt: 'a> Iterator for ReserveEntryIter<'a, 'dt> {
    type Item = ReserveEntry;
    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.fdt.buf();
        let address = buf
            .read_be_u64(self.offset + offset_of!(fdt_reserve_entry, address))
            .ok()?;
        let size = buf
            .read_be_u64(self.offset + offset_of!(fdt_reserve_entry, size))
            .ok()?;
        if address == 0 && size == 0 {
            return None;
        }
        self.offset += size_of::<fdt_reserve_entry>();
        Some(ReserveEntry { address, size })
    }
}

/// An iterator over all [`FdtItem`] objects.
#[derive(Clone)]
pub struct FdtItemIter<'a, 'dt: 'a> {
    /// Offset of the last opened device tree node.
    /// This is used to set properties' parent [`FdtNode`].
    ///
    /// Properties precede subnode definitions. Once a node has been closed
    /// this offset is reset to None; a property token seen in that state is
    /// a structural error.
    current_prop_parent_off: Option<usize>,

    /// Current offset into the structure block of the device tree.
    offset: usize,
    pub(crate) fdt: &'a Fdt<'dt>,
}

#[derive(Clone)]
pub struct FdtNodeIter<'a, 'dt: 'a>(pub FdtItemIter<'a, 'dt>);
impl<'a, 'dt: 'a> FallibleIterator for FdtNodeIter<'a, 'dt> {
    type Item = FdtNode<'a, 'dt>;
    type Error = FdtError;
    fn next(&mut self) -> Result<Option<Self::Item>> {
        self.0.next_node()
    }
}

#[derive(Clone)]
pub struct FdtPropIter<'a, 'dt: 'a>(pub FdtItemIter<'a, 'dt>);
impl<'a, 'dt: 'a> FallibleIterator for FdtPropIter<'a, 'dt> {
    type Error = FdtError;
    type Item = FdtProp<'a, 'dt>;
    fn next(&mut self) -> Result<Option<Self::Item>> {
        self.0.next_prop()
    }
}

#[derive(Clone)]
pub struct FdtNodePropIter<'a, 'dt: 'a>(pub FdtItemIter<'a, 'dt>);
impl<'a, 'dt: 'a> FallibleIterator for FdtNodePropIter<'a, 'dt> {
    type Error = FdtError;
    type Item = FdtProp<'a, 'dt>;
    fn next(&mut self) -> Result<Option<Self::Item>> {
        self.0.next_node_prop()
    }
}

#[derive(Clone)]
pub struct FdtCompatibleNodeIter<'s, 'a, 'dt: 'a> {
    pub iter: FdtItemIter<'a, 'dt>,
    pub string: &'s str,
}
impl<'s, 'a, 'dt: 'a> FallibleIterator for FdtCompatibleNodeIter<'s, 'a, 'dt> {
    type Error = FdtError;
    type Item = FdtNode<'a, 'dt>;
    fn next(&mut self) -> Result<Option<Self::Item>> {
        self.iter.next_compatible_node(self.string)
    }
}

impl<'a, 'dt: 'a> FdtItemIter<'a, 'dt> {
    pub fn new(fdt: &'a Fdt<'dt>) -> Self {
        Self {
            offset: 0,
            current_prop_parent_off: None,
            fdt,
        }
    }

    /// Start iteration at a byte offset into the structure block. The
    /// offset must land on a token boundary.
    pub(crate) fn at_offset(fdt: &'a Fdt<'dt>, offset: usize) -> Self {
        Self {
            offset,
            current_prop_parent_off: None,
            fdt,
        }
    }

    fn current_node_itr(&self) -> Option<FdtItemIter<'a, 'dt>> {
        self.current_prop_parent_off.map(|offset| FdtItemIter {
            fdt: self.fdt,
            current_prop_parent_off: self.current_prop_parent_off,
            offset,
        })
    }

    pub fn next_item(&mut self) -> Result<Option<FdtItem<'a, 'dt>>> {
        loop {
            let old_offset = self.offset;
            let res = next_token(self.fdt.struct_region(), &mut self.offset)?;

            match res {
                Some(Token::BeginNode { name }) => {
                    self.current_prop_parent_off = Some(old_offset);
                    return Ok(Some(FdtItem::Node(FdtNode {
                        parse_iter: self.clone(),
                        offset: old_offset,
                        name: from_utf8(name).map_err(|e| e.into()),
                    })));
                }
                Some(Token::Prop { nameoff, value }) => {
                    // Prop must come after a node, before its subnodes.
                    let prev_node = match self.current_node_itr() {
                        Some(n) => n,
                        None => return Err(FdtError::BadStructure),
                    };

                    return Ok(Some(FdtItem::Prop(FdtProp::new(prev_node, value, nameoff))));
                }
                Some(Token::EndNode) => {
                    // The current node has ended.
                    // No properties may follow until the next node starts.
                    self.current_prop_parent_off = None;
                }
                Some(Token::Nop) => continue,
                // The End token terminates iteration.
                None => return Ok(None),
            }
        }
    }

    pub fn next_prop(&mut self) -> Result<Option<FdtProp<'a, 'dt>>> {
        loop {
            match self.next() {
                Ok(Some(FdtItem::Prop(p))) => return Ok(Some(p)),
                Ok(Some(_n)) => continue,
                Ok(None) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn next_node(&mut self) -> Result<Option<FdtNode<'a, 'dt>>> {
        loop {
            match self.next() {
                Ok(Some(FdtItem::Node(n))) => return Ok(Some(n)),
                Ok(Some(_p)) => continue,
                Ok(None) => return Ok(None),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn next_node_prop(&mut self) -> Result<Option<FdtProp<'a, 'dt>>> {
        match self.next() {
            // Return if a new node or an EOF.
            Ok(Some(item)) => Ok(item.prop()),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Find the next node whose `compatible` property list contains
    /// `string`. Every string of the list is compared, not just the first.
    pub fn next_compatible_node(&mut self, string: &str) -> Result<Option<FdtNode<'a, 'dt>>> {
        while let Some(prop) = self.next_prop()? {
            if prop.name()? != "compatible" {
                continue;
            }
            let mut strings = prop.strings();
            while let Some(s) = strings.next()? {
                if s == string {
                    return Ok(Some(prop.node()));
                }
            }
        }
        Ok(None)
    }
}

impl<'a, 'dt: 'a> FallibleIterator for FdtItemIter<'a, 'dt> {
    type Error = FdtError;
    type Item = FdtItem<'a, 'dt>;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        self.next_item()
    }
}
