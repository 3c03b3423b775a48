//! Traits shared by the direct parser and the unflattened tree.

pub mod item;
pub mod prop;

#[doc(inline)]
pub use item::UnwrappableItem;
#[doc(inline)]
pub use prop::{PropReader, StringListIter};
