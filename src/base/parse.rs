//! Low level tokenizing of the structure block.

use core::mem::size_of;

use memoffset::offset_of;
use num_traits::FromPrimitive;

use crate::error::{FdtError, Result};
use crate::priv_util::SliceRead;
use crate::spec::{fdt_prop_header, FdtTok};

/// Round a structure block offset up to the next token boundary.
pub(crate) const fn align4(off: usize) -> usize {
    (off + 3) & !3
}

/// A decoded token of the structure block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'dt> {
    /// Opens a node. `name` includes the unit address but not the NUL
    /// terminator; the root's name is empty.
    BeginNode { name: &'dt [u8] },
    /// Closes the most recently opened node.
    EndNode,
    /// A property record of the most recently opened node. `nameoff`
    /// still needs resolving against the string table.
    Prop { nameoff: usize, value: &'dt [u8] },
    /// Padding left behind by editors; carries nothing.
    Nop,
}

/// Decode the token at `*offset` within a structure block and advance
/// `*offset` past it to the next 4 byte boundary.
///
/// Returns `Ok(None)` only at the End token, with the offset left just
/// past it (so it equals the block's used size). A record running off the
/// end of the block fails with [`FdtError::Truncated`] and an unknown
/// token value with [`FdtError::BadStructure`]; `*offset` is unspecified
/// after an error.
pub fn next_token<'dt>(buf: &'dt [u8], offset: &mut usize) -> Result<Option<Token<'dt>>> {
    let mut off = *offset;
    let tag = buf.read_be_u32(off)?;
    off += size_of::<u32>();

    let token = match FdtTok::from_u32(tag) {
        Some(FdtTok::BeginNode) => {
            let name = buf.read_bstring0(off)?;
            off += name.len() + 1;
            Token::BeginNode { name }
        }
        Some(FdtTok::Prop) => {
            let len = buf.read_be_u32(off + offset_of!(fdt_prop_header, len))? as usize;
            let nameoff = buf.read_be_u32(off + offset_of!(fdt_prop_header, nameoff))? as usize;
            off += size_of::<fdt_prop_header>();
            let end = off.checked_add(len).ok_or(FdtError::Truncated)?;
            let value = buf.get(off..end).ok_or(FdtError::Truncated)?;
            off = end;
            Token::Prop { nameoff, value }
        }
        Some(FdtTok::EndNode) => Token::EndNode,
        Some(FdtTok::Nop) => Token::Nop,
        Some(FdtTok::End) => {
            *offset = off;
            return Ok(None);
        }
        None => return Err(FdtError::BadStructure),
    };
    *offset = align4(off);
    Ok(Some(token))
}

/// Advance `*offset` past the token there without decoding its payload,
/// mirroring [`next_token`]'s return contract.
pub fn skip_token(buf: &[u8], offset: &mut usize) -> Result<Option<()>> {
    Ok(next_token(buf, offset)?.map(|_| ()))
}

/// A plain iterator over a structure block's tokens.
///
/// Ends at the End token; a damaged token stream ends iteration as well.
/// Use [`next_token`] directly to tell those apart.
#[derive(Clone)]
pub struct TokenIter<'dt> {
    buf: &'dt [u8],
    offset: usize,
}

impl<'dt> TokenIter<'dt> {
    pub fn new(buf: &'dt [u8]) -> Self {
        Self { buf, offset: 0 }
    }
}

impl<'dt> Iterator for TokenIter<'dt> {
    type Item = Token<'dt>;

    fn next(&mut self) -> Option<Token<'dt>> {
        next_token(self.buf, &mut self.offset).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align4_rounds_up_to_token_boundaries() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(7), 8);
    }

    #[test]
    fn end_token_reports_clean_end() {
        // BEGIN_NODE "" / END_NODE / END
        let buf: &[u8] = &[
            0, 0, 0, 1, 0, 0, 0, 0, //
            0, 0, 0, 2, //
            0, 0, 0, 9,
        ];
        let mut off = 0;
        assert_eq!(
            next_token(buf, &mut off).unwrap(),
            Some(Token::BeginNode { name: b"" })
        );
        assert_eq!(next_token(buf, &mut off).unwrap(), Some(Token::EndNode));
        assert_eq!(next_token(buf, &mut off).unwrap(), None);
        assert_eq!(off, buf.len());
    }

    #[test]
    fn torn_records_fail_rather_than_lie() {
        // A property whose value claims to run past the block.
        let buf: &[u8] = &[
            0, 0, 0, 3, // PROP
            0, 0, 0, 64, // len
            0, 0, 0, 0, // nameoff
            1, 2, 3, 4,
        ];
        let mut off = 0;
        assert_eq!(next_token(buf, &mut off), Err(FdtError::Truncated));

        // An unknown token value.
        let buf: &[u8] = &[0, 0, 0, 7];
        let mut off = 0;
        assert_eq!(next_token(buf, &mut off), Err(FdtError::BadStructure));
    }
}
