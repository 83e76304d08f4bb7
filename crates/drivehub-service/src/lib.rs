//! # drivehub-service
//!
//! Business logic for DriveHub's virtual filesystem. Each service composes
//! the atomic record-store operations from `drivehub-database` with the
//! blob store to implement one user-facing concern: structural mutation
//! ([`NodeService`]), the recycle bin ([`BinService`]), breadcrumbs and
//! trees ([`TreeService`]), content deduplication ([`ContentAddresser`])
//! and public file links ([`ShareService`]).
//!
//! Services follow constructor injection: all dependencies are provided
//! at construction time via `Arc` references.

pub mod content;
pub mod context;
pub mod node;
pub mod recycle;
pub mod share;
pub mod tree;

pub use content::{ContentAddresser, ContentSource};
pub use context::RequestContext;
pub use node::{DeleteReport, NodeService};
pub use recycle::BinService;
pub use share::ShareService;
pub use tree::TreeService;
