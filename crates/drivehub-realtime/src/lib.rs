//! # drivehub-realtime
//!
//! Fan-out of transfer job progress to live observers. Each owner has one
//! in-memory broadcast channel; a [`Subscription`] starts from the current
//! snapshot of every active job and then follows updates in order.
//!
//! Publishing never waits on observers. A subscriber that falls behind the
//! channel buffer is resynchronised from the latest snapshots instead of
//! slowing the transfer down.

pub mod event;
pub mod hub;
pub mod subscription;

pub use event::ProgressEvent;
pub use hub::ProgressHub;
pub use subscription::Subscription;
