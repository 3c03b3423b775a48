//! Errors reported by this library.
//!
//! Failures fall into a few families: format errors ([`BadMagic`],
//! [`BadVersion`], [`BadLayout`], [`Truncated`], [`BadAtagList`],
//! [`BadString`]) which mean the input bytes cannot be trusted at all,
//! structural errors ([`BadStructure`]) raised when the token stream itself
//! is inconsistent, capacity errors ([`NoSpace`]) raised by editing and
//! region tracking when a buffer cannot hold the result, and plain lookup
//! misses ([`NotFound`]). Lookup misses are ordinary and often handled by
//! creating the missing node.
//!
//! [`BadMagic`]: FdtError::BadMagic
//! [`BadVersion`]: FdtError::BadVersion
//! [`BadLayout`]: FdtError::BadLayout
//! [`Truncated`]: FdtError::Truncated
//! [`BadAtagList`]: FdtError::BadAtagList
//! [`BadString`]: FdtError::BadString
//! [`BadStructure`]: FdtError::BadStructure
//! [`NoSpace`]: FdtError::NoSpace
//! [`NotFound`]: FdtError::NotFound

use crate::priv_util::SliceReadError;
use core::fmt;
use core::result;
use core::str::Utf8Error;

/// An error describing why a boot data structure could not be parsed or
/// edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtError {
    /// Invalid caller-supplied parameter.
    BadParameter(&'static str),

    /// The magic number FDT_MAGIC was not found at the start of the buffer.
    BadMagic,

    /// The blob's version fields fall outside the supported range
    /// (version >= 0x10, last compatible version <= 0x11).
    BadVersion,

    /// The header's block offsets or sizes describe regions that overlap,
    /// are misaligned, or escape `totalsize`.
    BadLayout,

    /// A read ran past the end of the buffer.
    Truncated,

    /// The structure block's token sequence is inconsistent, for example a
    /// stray end-of-node token or a property appearing after a subnode.
    BadStructure,

    /// The given offset does not point at the expected kind of token.
    BadOffset,

    /// A lookup path was malformed (paths must begin with `/`).
    BadPath,

    /// The requested node or property does not exist.
    NotFound,

    /// The node or property to be created already exists.
    Exists,

    /// The operation needs more room than the buffer or region set provides.
    NoSpace,

    /// The buffer does not hold a well formed ATAG list. Callers may retry
    /// with an alternate candidate pointer.
    BadAtagList,

    /// A string within the tree was not valid UTF-8.
    BadString(Utf8Error),
}

impl From<SliceReadError> for FdtError {
    fn from(_: SliceReadError) -> FdtError {
        FdtError::Truncated
    }
}

impl From<Utf8Error> for FdtError {
    fn from(e: Utf8Error) -> FdtError {
        FdtError::BadString(e)
    }
}

/// The result of a parse or edit.
pub type Result<T> = core::result::Result<T, FdtError>;

impl fmt::Display for FdtError {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match *self {
            FdtError::BadParameter(err) => write!(f, "invalid parameter supplied: {}", err),
            FdtError::BadMagic => write!(f, "buffer does not begin with the device tree magic number"),
            FdtError::BadVersion => write!(f, "device tree version is outside the supported range"),
            FdtError::BadLayout => write!(f, "device tree header describes a malformed block layout"),
            FdtError::Truncated => write!(f, "device tree data ended prematurely"),
            FdtError::BadStructure => write!(f, "device tree structure block is inconsistent"),
            FdtError::BadOffset => write!(f, "offset does not reference the expected token"),
            FdtError::BadPath => write!(f, "malformed node path"),
            FdtError::NotFound => write!(f, "no such node or property"),
            FdtError::Exists => write!(f, "node or property already exists"),
            FdtError::NoSpace => write!(f, "not enough room left in the buffer"),
            FdtError::BadAtagList => write!(f, "buffer does not hold a valid ATAG list"),
            FdtError::BadString(utf_err) => write!(f, "failed to parse device tree string: {}", utf_err),
        }
    }
}
