//! # drivehub-core
//!
//! Core crate for DriveHub. Contains the unified error system, configuration
//! schemas, typed identifiers, pagination types, and the traits through which
//! the engine talks to its external collaborators (blob store, remote content
//! source).
//!
//! This crate has **no** internal dependencies on other DriveHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
