//! Content index entities.

pub mod model;

pub use model::ContentEntry;
