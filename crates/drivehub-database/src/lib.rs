//! # drivehub-database
//!
//! Record store for DriveHub. The [`store`] module defines the atomic
//! check-and-write operations the engine relies on; [`postgres`] implements
//! them on PostgreSQL and [`store::memory`] implements them in process.

pub mod connection;
pub mod error;
pub mod migration;
pub mod postgres;
pub mod store;

pub use connection::DatabasePool;
pub use postgres::PgStore;
pub use store::{ContentIndexStore, JobStore, MemoryStore, NodeStore, ShareStore};
