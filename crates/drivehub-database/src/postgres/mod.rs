//! PostgreSQL record store.
//!
//! Structural writes that can change ancestry or binned state (move, bin,
//! restore) take an exclusive per-owner advisory lock for the duration of
//! their transaction; inserts take the same lock in shared mode, so they
//! run in parallel with each other but never interleave with a subtree
//! rewrite. Sibling-name uniqueness is enforced by the
//! `nodes_live_sibling_name_key` partial index.

mod content;
mod job;
mod node;
mod rows;
mod share;

use sqlx::{PgPool, Postgres, Transaction};

use drivehub_core::result::AppResult;
use drivehub_core::types::OwnerId;

use crate::error::map_sqlx;

/// Record store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx("Failed to begin transaction", e))
    }
}

/// Which side of the per-owner structure lock a transaction takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerLock {
    Shared,
    Exclusive,
}

async fn lock_owner(
    tx: &mut Transaction<'_, Postgres>,
    owner: OwnerId,
    mode: OwnerLock,
) -> AppResult<()> {
    let sql = match mode {
        OwnerLock::Shared => {
            "SELECT pg_advisory_xact_lock_shared(hashtextextended(($1::uuid)::text, 0))"
        }
        OwnerLock::Exclusive => {
            "SELECT pg_advisory_xact_lock(hashtextextended(($1::uuid)::text, 0))"
        }
    };
    sqlx::query(sql)
        .bind(owner)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx("Failed to lock owner tree", e))?;
    Ok(())
}

async fn commit(tx: Transaction<'_, Postgres>) -> AppResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx("Failed to commit transaction", e))
}
