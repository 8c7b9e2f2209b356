//! Reconstruction of typed COM entities from raw classes-root entries.

pub mod builder;
pub mod entity;
pub mod graph;
pub mod rules;
pub mod taxonomy;

pub use builder::Classifier;
