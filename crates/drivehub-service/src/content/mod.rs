//! Content addressing and deduplication.

pub mod addresser;

pub use addresser::{ContentAddresser, ContentSource};
