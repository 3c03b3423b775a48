//! Module exporting traits of this library.
pub(crate) use crate::common::item::UnwrappableItem;
pub(crate) use crate::priv_util::SliceRead;

pub use crate::common::prop::PropReader;

pub use fallible_iterator::FallibleIterator;
