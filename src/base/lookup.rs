//! Offset-based node and property lookups.
//!
//! These helpers address nodes the way the in-place editor does, by the
//! byte offset of their begin token within the structure block. They walk
//! the token stream directly rather than materializing handles, which
//! keeps them usable against trees that are about to be edited.

use core::cmp::min;
use core::num::NonZeroUsize;

use crate::common::prop::StringListIter;
use crate::error::{FdtError, Result};
use crate::prelude::*;

use super::fdt::Fdt;
use super::item::FdtItem;
use super::iters::{FdtItemIter, FdtNodePropIter};
use super::parse::{next_token, Token};

/// Check a node name against a lookup component.
///
/// A component without a unit address matches any unit address, so
/// `serial` matches both `serial` and `serial@10009000`. A component that
/// carries a unit address must match exactly.
fn node_name_matches(name: &[u8], component: &[u8]) -> bool {
    if name.len() < component.len() || &name[..component.len()] != component {
        return false;
    }
    if name.len() == component.len() {
        return true;
    }
    name[component.len()] == b'@' && !component.contains(&b'@')
}

/// Parse the begin token at `offset`, returning the node's name bytes and
/// leaving `offset` just past the token.
fn expect_begin_node<'dt>(fdt: &Fdt<'dt>, offset: &mut usize) -> Result<&'dt [u8]> {
    match next_token(fdt.struct_region(), offset) {
        Ok(Some(Token::BeginNode { name })) => Ok(name),
        _ => Err(FdtError::BadOffset),
    }
}

/// Returns the offset of the root node's begin token.
pub fn root_offset(fdt: &Fdt) -> Result<usize> {
    let buf = fdt.struct_region();
    let mut off = 0;
    loop {
        let tok_off = off;
        match next_token(buf, &mut off)? {
            Some(Token::BeginNode { .. }) => return Ok(tok_off),
            Some(Token::Nop) => continue,
            _ => return Err(FdtError::BadStructure),
        }
    }
}

/// Returns the name of the node at `offset`, including its unit address.
pub fn node_name<'dt>(fdt: &Fdt<'dt>, offset: usize) -> Result<&'dt str> {
    let mut off = offset;
    let name = expect_begin_node(fdt, &mut off)?;
    Ok(core::str::from_utf8(name)?)
}

/// Find a direct subnode of the node at `parent` by name.
///
/// The name may include a unit address for an exact match or omit it to
/// match the first subnode of that base name.
pub fn subnode_offset(fdt: &Fdt, parent: usize, name: &str) -> Result<usize> {
    let buf = fdt.struct_region();
    let mut off = parent;
    expect_begin_node(fdt, &mut off)?;

    // Depth below the parent; only its direct children are candidates.
    let mut depth = 0usize;
    loop {
        let tok_off = off;
        match next_token(buf, &mut off)? {
            Some(Token::BeginNode { name: child }) => {
                if depth == 0 && node_name_matches(child, name.as_bytes()) {
                    return Ok(tok_off);
                }
                depth += 1;
            }
            Some(Token::EndNode) => {
                if depth == 0 {
                    return Err(FdtError::NotFound);
                }
                depth -= 1;
            }
            Some(Token::Prop { .. }) | Some(Token::Nop) => (),
            // The parent node was never closed.
            None => return Err(FdtError::BadStructure),
        }
    }
}

/// Resolve an absolute path such as `/soc/serial@10009000` to a node
/// offset.
///
/// Paths must begin with `/`; aliases are not resolved. Repeated or
/// trailing slashes are tolerated.
pub fn path_offset(fdt: &Fdt, path: &str) -> Result<usize> {
    if !path.starts_with('/') {
        return Err(FdtError::BadPath);
    }
    let mut off = root_offset(fdt)?;
    for component in path.split('/') {
        if component.is_empty() {
            continue;
        }
        off = subnode_offset(fdt, off, component)?;
    }
    Ok(off)
}

/// Returns the value of the named property of the node at `offset`.
pub fn property<'dt>(fdt: &Fdt<'dt>, offset: usize, name: &str) -> Result<&'dt [u8]> {
    let buf = fdt.struct_region();
    let mut off = offset;
    expect_begin_node(fdt, &mut off)?;
    loop {
        match next_token(buf, &mut off)? {
            Some(Token::Prop { nameoff, value }) => {
                if fdt.prop_name(nameoff)? == name.as_bytes() {
                    return Ok(value);
                }
            }
            Some(Token::Nop) => (),
            // First non-property token ends the node's property run.
            _ => return Err(FdtError::NotFound),
        }
    }
}

/// Returns the named property of the node at `offset` as a big endian
/// u32.
pub fn property_u32(fdt: &Fdt, offset: usize, name: &str) -> Result<u32> {
    property(fdt, offset, name)?
        .read_be_u32(0)
        .or(Err(FdtError::BadOffset))
}

/// Returns the named property of the node at `offset` as a big endian
/// u64.
pub fn property_u64(fdt: &Fdt, offset: usize, name: &str) -> Result<u64> {
    property(fdt, offset, name)?
        .read_be_u64(0)
        .or(Err(FdtError::BadOffset))
}

/// Iterate over the properties of the node at `offset`.
pub fn props_of<'a, 'dt: 'a>(fdt: &'a Fdt<'dt>, offset: usize) -> Result<FdtNodePropIter<'a, 'dt>> {
    let mut iter = FdtItemIter::at_offset(fdt, offset);
    match iter.next()? {
        Some(FdtItem::Node(_)) => Ok(FdtNodePropIter(iter)),
        _ => Err(FdtError::BadOffset),
    }
}

/// Find a property record of the node at `offset` by name.
///
/// Returns the byte offset of the property's token and the length of its
/// value, which is what the editor needs to resize it in place.
pub(crate) fn find_prop(fdt: &Fdt, offset: usize, name: &str) -> Result<Option<(usize, usize)>> {
    let buf = fdt.struct_region();
    let mut off = offset;
    expect_begin_node(fdt, &mut off)?;
    loop {
        let tok_off = off;
        match next_token(buf, &mut off)? {
            Some(Token::Prop { nameoff, value }) => {
                if fdt.prop_name(nameoff)? == name.as_bytes() {
                    return Ok(Some((tok_off, value.len())));
                }
            }
            Some(Token::Nop) => (),
            _ => return Ok(None),
        }
    }
}

/// Offset just past the begin token of the node at `offset`. New
/// properties are inserted here, at the front of the property run.
pub(crate) fn props_start(fdt: &Fdt, offset: usize) -> Result<usize> {
    let mut off = offset;
    expect_begin_node(fdt, &mut off)?;
    Ok(off)
}

/// Offset of the first token after the node's properties, where a new
/// subnode is inserted.
pub(crate) fn node_header_end(fdt: &Fdt, offset: usize) -> Result<usize> {
    let buf = fdt.struct_region();
    let mut off = offset;
    expect_begin_node(fdt, &mut off)?;
    loop {
        let tok_off = off;
        match next_token(buf, &mut off)? {
            Some(Token::Prop { .. }) | Some(Token::Nop) => (),
            Some(Token::BeginNode { .. }) | Some(Token::EndNode) => return Ok(tok_off),
            None => return Err(FdtError::BadStructure),
        }
    }
}

/// Offset just past the end token that closes the node at `offset`. The
/// node's whole record spans `offset..span_end`.
pub(crate) fn node_span_end(fdt: &Fdt, offset: usize) -> Result<usize> {
    let buf = fdt.struct_region();
    let mut off = offset;
    expect_begin_node(fdt, &mut off)?;
    let mut depth = 0usize;
    loop {
        match next_token(buf, &mut off)? {
            Some(Token::BeginNode { .. }) => depth += 1,
            Some(Token::EndNode) => {
                if depth == 0 {
                    return Ok(off);
                }
                depth -= 1;
            }
            Some(Token::Prop { .. }) | Some(Token::Nop) => (),
            None => return Err(FdtError::BadStructure),
        }
    }
}

/// Score how well the `compatible` list of the node at `offset` matches
/// `compat`.
///
/// Returns the 1-based position of `compat` within the list, so lower
/// scores are better matches, or `None` when the string is not listed or
/// the node carries no `compatible` property.
pub fn compat_score(fdt: &Fdt, offset: usize, compat: &str) -> Result<Option<NonZeroUsize>> {
    let value = match property(fdt, offset, "compatible") {
        Ok(v) => v,
        Err(FdtError::NotFound) => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut score = 1usize;
    let mut strings = StringListIter::new(value);
    while let Some(s) = strings.next()? {
        if s == compat {
            return Ok(NonZeroUsize::new(score));
        }
        score += 1;
    }
    Ok(None)
}

/// Does the `compatible` list of the node at `offset` contain `compat`?
pub fn is_compatible(fdt: &Fdt, offset: usize, compat: &str) -> Result<bool> {
    Ok(compat_score(fdt, offset, compat)?.is_some())
}

/// A board description a flattened tree can be matched against.
pub trait MachineDesc {
    /// Human readable board name, for diagnostics.
    fn name(&self) -> &str;
    /// The `compatible` strings this board answers to.
    fn compatibles(&self) -> &[&str];
}

/// Select the machine description that best matches the tree's root
/// `compatible` list.
///
/// Each candidate's score is the best (lowest) score among its
/// `compatible` strings; the candidate with the lowest overall score
/// wins. On a tie the earliest candidate in `machines` is kept.
pub fn match_machine<'m, M: MachineDesc>(fdt: &Fdt, machines: &'m [M]) -> Result<Option<&'m M>> {
    let root = root_offset(fdt)?;
    let mut best: Option<(&'m M, NonZeroUsize)> = None;
    for machine in machines {
        let mut machine_score: Option<NonZeroUsize> = None;
        for compat in machine.compatibles() {
            if let Some(score) = compat_score(fdt, root, compat)? {
                machine_score = Some(match machine_score {
                    Some(prev) => min(prev, score),
                    None => score,
                });
            }
        }
        if let Some(score) = machine_score {
            log::debug!("machine {} matched with score {}", machine.name(), score);
            match best {
                Some((_, best_score)) if score >= best_score => (),
                _ => best = Some((machine, score)),
            }
        }
    }
    Ok(best.map(|(machine, _)| machine))
}

#[cfg(test)]
mod tests {
    use super::node_name_matches;

    #[test]
    fn bare_component_matches_any_unit_address() {
        assert!(node_name_matches(b"serial@10009000", b"serial"));
        assert!(node_name_matches(b"serial", b"serial"));
        assert!(!node_name_matches(b"serial2", b"serial"));
        assert!(!node_name_matches(b"ser", b"serial"));
    }

    #[test]
    fn unit_address_component_matches_exactly() {
        assert!(node_name_matches(b"serial@10009000", b"serial@10009000"));
        assert!(!node_name_matches(b"serial@10009000", b"serial@1000"));
        assert!(!node_name_matches(b"serial@10009000", b"serial@20000000"));
    }
}
