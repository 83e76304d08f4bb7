//! Mapping of sqlx failures into [`AppError`].

use drivehub_core::error::{AppError, ErrorKind};

/// Unique index guarding live sibling names.
pub(crate) const SIBLING_NAME_INDEX: &str = "nodes_live_sibling_name_key";
/// Foreign key from a node to its parent folder.
pub(crate) const PARENT_FK: &str = "nodes_parent_id_fkey";

/// Classify a sqlx error.
///
/// Pool exhaustion and transport failures are retryable and surface as
/// `StorageUnavailable`; everything else is a `Database` error.
pub(crate) fn map_sqlx(context: &str, err: sqlx::Error) -> AppError {
    let kind = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ErrorKind::StorageUnavailable
        }
        _ => ErrorKind::Database,
    };
    AppError::with_source(kind, format!("{context}: {err}"), err)
}

/// Like [`map_sqlx`], but turns sibling-name and parent-link constraint
/// violations into `Conflict`.
pub(crate) fn map_node_write(context: &str, name: &str, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some(SIBLING_NAME_INDEX) => {
                return AppError::conflict(format!(
                    "An item named '{name}' already exists in this location"
                ));
            }
            Some(PARENT_FK) => {
                return AppError::conflict(format!("Folder '{name}' is not empty"));
            }
            _ => {}
        }
    }
    map_sqlx(context, err)
}
