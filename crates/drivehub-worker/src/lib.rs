//! Background work for DriveHub.
//!
//! This crate provides:
//! - The [`TaskManager`], a bounded registry of URL download jobs that
//!   run independently of the request that submitted them
//! - An HTTP [`RemoteSource`](drivehub_core::traits::source::RemoteSource)
//!   backed by `reqwest`
//! - A cron scheduler for recycle bin expiry and content reaping

pub mod manager;
pub mod scheduler;
pub mod source;
pub mod transfer;

pub use manager::{SubmitRequest, TaskManager};
pub use scheduler::CronScheduler;
pub use source::HttpSource;
