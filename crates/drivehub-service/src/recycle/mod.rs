//! Recycle bin: soft delete, restore, and expiry.

pub mod service;

pub use service::{BinReport, BinService, PurgeReport, RestoreReport};
