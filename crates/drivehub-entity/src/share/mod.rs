//! Public share link entities.

pub mod model;

pub use model::SharedLink;
