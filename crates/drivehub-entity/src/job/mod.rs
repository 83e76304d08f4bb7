//! Background transfer job entities.

pub mod model;
pub mod snapshot;
pub mod status;

pub use model::{NewTransferJob, TransferJob};
pub use snapshot::JobSnapshot;
pub use status::{JobKind, JobState};
