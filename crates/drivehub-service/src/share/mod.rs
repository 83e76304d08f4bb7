//! Public share links for files.

pub mod service;

pub use service::ShareService;
