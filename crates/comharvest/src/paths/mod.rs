//! Real-path to token mapping and value virtualization.

pub mod index;
pub mod shortpath;
pub mod virtualize;

pub use index::PathTokenIndex;
pub use virtualize::Virtualizer;
