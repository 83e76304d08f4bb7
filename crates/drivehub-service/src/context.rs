//! Request context carrying the acting owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use drivehub_core::error::AppError;
use drivehub_core::types::OwnerId;

/// Context for the current request.
///
/// The identity provider has already authenticated the caller; the engine
/// trusts `owner` as given and scopes every operation to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The acting owner.
    pub owner: OwnerId,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            request_time: Utc::now(),
        }
    }

    /// Fails with `Unauthorized` unless `owner` is the acting owner.
    pub fn require_owner(&self, owner: OwnerId) -> Result<(), AppError> {
        if owner == self.owner {
            Ok(())
        } else {
            Err(AppError::unauthorized("Not the owner of this resource"))
        }
    }
}
