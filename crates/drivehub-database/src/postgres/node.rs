//! Node queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::types::{NodeId, OwnerId};
use drivehub_entity::content::ContentEntry;
use drivehub_entity::node::{Node, NodeKind};

use super::rows::{NodeRow, into_nodes};
use super::{OwnerLock, PgStore, commit, lock_owner};
use crate::error::{map_node_write, map_sqlx};
use crate::store::{
    BinOutcome, DeletedNode, FileInsert, FileInsertOutcome, NodeStore, RestoreOutcome,
};

const INSERT_NODE: &str = "INSERT INTO nodes \
    (id, owner_id, parent_id, name, kind, size_bytes, content_hash, blob_locator, mime_type, \
     created_at, updated_at, is_binned, binned_at, is_starred) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING *";

async fn fetch_node(
    tx: &mut Transaction<'_, Postgres>,
    id: NodeId,
    for_update: bool,
) -> AppResult<Option<Node>> {
    let sql = if for_update {
        "SELECT * FROM nodes WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT * FROM nodes WHERE id = $1"
    };
    sqlx::query_as::<_, NodeRow>(sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx("Failed to load node", e))?
        .map(Node::try_from)
        .transpose()
}

/// Returns whether `parent` is a live folder of `owner`, holding a share
/// lock on its row until the transaction ends.
async fn lock_live_folder(
    tx: &mut Transaction<'_, Postgres>,
    owner: OwnerId,
    parent: NodeId,
) -> AppResult<bool> {
    let row: Option<(OwnerId, String, bool)> =
        sqlx::query_as("SELECT owner_id, kind, is_binned FROM nodes WHERE id = $1 FOR SHARE")
            .bind(parent)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx("Failed to load parent folder", e))?;
    Ok(matches!(row, Some((o, kind, binned)) if o == owner && kind == "folder" && !binned))
}

async fn check_parent(
    tx: &mut Transaction<'_, Postgres>,
    owner: OwnerId,
    parent: Option<NodeId>,
) -> AppResult<()> {
    match parent {
        Some(pid) if !lock_live_folder(tx, owner, pid).await? => {
            Err(AppError::not_found(format!("Folder {pid} not found")))
        }
        _ => Ok(()),
    }
}

async fn insert_row(tx: &mut Transaction<'_, Postgres>, node: &Node) -> AppResult<Node> {
    let file = node.file();
    sqlx::query_as::<_, NodeRow>(INSERT_NODE)
        .bind(node.id)
        .bind(node.owner)
        .bind(node.parent_id)
        .bind(&node.name)
        .bind(node.kind.as_str())
        .bind(file.map(|f| f.size_bytes as i64))
        .bind(file.map(|f| f.content_hash.as_str()))
        .bind(file.map(|f| f.blob_locator.as_str()))
        .bind(file.map(|f| f.mime_type.as_str()))
        .bind(node.created_at)
        .bind(node.updated_at)
        .bind(node.is_binned)
        .bind(node.binned_at)
        .bind(node.is_starred)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_node_write("Failed to insert node", &node.name, e))?
        .try_into()
}

#[async_trait]
impl NodeStore for PgStore {
    async fn get(&self, id: NodeId) -> AppResult<Option<Node>> {
        sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to find node", e))?
            .map(Node::try_from)
            .transpose()
    }

    async fn insert_folder(&self, node: Node) -> AppResult<Node> {
        if !node.is_folder() {
            return Err(AppError::invalid_operation("Expected a folder node"));
        }
        let mut tx = self.begin().await?;
        lock_owner(&mut tx, node.owner, OwnerLock::Shared).await?;
        check_parent(&mut tx, node.owner, node.parent_id).await?;
        let stored = insert_row(&mut tx, &node).await?;
        commit(tx).await?;
        Ok(stored)
    }

    async fn insert_file(
        &self,
        mut node: Node,
        fresh_locator: Option<&str>,
    ) -> AppResult<FileInsertOutcome> {
        let NodeKind::File(mut file) = node.kind.clone() else {
            return Err(AppError::invalid_operation("Expected a file node"));
        };
        let mut tx = self.begin().await?;
        lock_owner(&mut tx, node.owner, OwnerLock::Shared).await?;
        check_parent(&mut tx, node.owner, node.parent_id).await?;

        let taken = match fresh_locator {
            None => sqlx::query_as::<_, ContentEntry>(
                "UPDATE content_index SET ref_count = ref_count + 1, updated_at = $2 \
                 WHERE content_hash = $1 AND ref_count > 0 RETURNING *",
            )
            .bind(&file.content_hash)
            .bind(node.updated_at)
            .fetch_optional(&mut *tx)
            .await,
            Some(locator) => sqlx::query_as::<_, ContentEntry>(
                "INSERT INTO content_index \
                 (content_hash, blob_locator, ref_count, size_bytes, created_at, updated_at) \
                 VALUES ($1, $2, 1, $3, $4, $4) \
                 ON CONFLICT (content_hash) DO UPDATE \
                 SET ref_count = content_index.ref_count + 1, updated_at = EXCLUDED.updated_at \
                 WHERE content_index.ref_count > 0 RETURNING *",
            )
            .bind(&file.content_hash)
            .bind(locator)
            .bind(file.size_bytes as i64)
            .bind(node.updated_at)
            .fetch_optional(&mut *tx)
            .await,
        }
        .map_err(|e| map_sqlx("Failed to reference content", e))?;

        let Some(entry) = taken else {
            let existing = sqlx::query_as::<_, ContentEntry>(
                "SELECT * FROM content_index WHERE content_hash = $1",
            )
            .bind(&file.content_hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx("Failed to load content entry", e))?;
            return Ok(match existing {
                Some(entry) => FileInsertOutcome::ContentPending(entry),
                None => FileInsertOutcome::ContentMissing,
            });
        };

        let deduplicated = fresh_locator.is_none() || entry.ref_count > 1;
        file.blob_locator = entry.blob_locator.clone();
        node.kind = NodeKind::File(file);
        let stored = insert_row(&mut tx, &node).await?;
        commit(tx).await?;
        Ok(FileInsertOutcome::Inserted(FileInsert {
            node: stored,
            entry,
            deduplicated,
        }))
    }

    async fn rename(&self, id: NodeId, name: &str, now: DateTime<Utc>) -> AppResult<Node> {
        sqlx::query_as::<_, NodeRow>(
            "UPDATE nodes SET name = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_node_write("Failed to rename node", name, e))?
        .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?
        .try_into()
    }

    async fn move_to(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        now: DateTime<Utc>,
        max_depth: usize,
    ) -> AppResult<Node> {
        let owner = match self.get(id).await? {
            Some(node) if !node.is_binned => node.owner,
            _ => return Err(AppError::not_found(format!("Node {id} not found"))),
        };
        let mut tx = self.begin().await?;
        lock_owner(&mut tx, owner, OwnerLock::Exclusive).await?;
        let node = match fetch_node(&mut tx, id, true).await? {
            Some(node) if !node.is_binned => node,
            _ => return Err(AppError::not_found(format!("Node {id} not found"))),
        };

        if let Some(dest) = new_parent {
            let bound = i32::try_from(max_depth).unwrap_or(i32::MAX);
            let chain: Vec<(NodeId, i32)> = sqlx::query_as(
                "WITH RECURSIVE chain AS ( \
                    SELECT id, parent_id, 1 AS depth FROM nodes WHERE id = $1 AND owner_id = $3 \
                    UNION ALL \
                    SELECT n.id, n.parent_id, c.depth + 1 FROM nodes n \
                    INNER JOIN chain c ON n.id = c.parent_id \
                    WHERE c.depth <= $2 AND n.owner_id = $3 \
                 ) SELECT id, depth FROM chain",
            )
            .bind(dest)
            .bind(bound)
            .bind(owner)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx("Failed to walk ancestry", e))?;

            if chain.iter().any(|(ancestor, _)| *ancestor == id) {
                return Err(AppError::invalid_operation(
                    "Cannot move a folder into itself or one of its descendants",
                ));
            }
            if chain.iter().any(|(_, depth)| *depth > bound) {
                return Err(AppError::internal(format!(
                    "Ancestry of {dest} exceeds {max_depth} levels"
                )));
            }
        }

        check_parent(&mut tx, owner, new_parent).await?;
        if node.parent_id == new_parent {
            return Ok(node);
        }

        let moved: Node = sqlx::query_as::<_, NodeRow>(
            "UPDATE nodes SET parent_id = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(new_parent)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_node_write("Failed to move node", &node.name, e))?
        .try_into()?;
        commit(tx).await?;
        Ok(moved)
    }

    async fn set_starred(
        &self,
        id: NodeId,
        starred: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Node> {
        sqlx::query_as::<_, NodeRow>(
            "UPDATE nodes SET is_starred = $2, updated_at = $3 \
             WHERE id = $1 AND NOT is_binned RETURNING *",
        )
        .bind(id)
        .bind(starred)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to update star", e))?
        .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?
        .try_into()
    }

    async fn bin_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<BinOutcome> {
        let owner = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?
            .owner;
        let mut tx = self.begin().await?;
        lock_owner(&mut tx, owner, OwnerLock::Exclusive).await?;

        let result = sqlx::query(
            "WITH RECURSIVE sub AS ( \
                SELECT id FROM nodes WHERE id = $1 \
                UNION ALL \
                SELECT n.id FROM nodes n INNER JOIN sub s ON n.parent_id = s.id \
             ) \
             UPDATE nodes SET is_binned = TRUE, binned_at = $2, updated_at = $2 \
             WHERE id IN (SELECT id FROM sub) AND NOT is_binned",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx("Failed to bin subtree", e))?;

        let root = fetch_node(&mut tx, id, false)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?;
        commit(tx).await?;
        Ok(BinOutcome {
            root,
            binned: result.rows_affected(),
        })
    }

    async fn restore_subtree(&self, id: NodeId, now: DateTime<Utc>) -> AppResult<RestoreOutcome> {
        let owner = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?
            .owner;
        let mut tx = self.begin().await?;
        lock_owner(&mut tx, owner, OwnerLock::Exclusive).await?;
        let root = fetch_node(&mut tx, id, true)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?;
        if !root.is_binned {
            return Ok(RestoreOutcome {
                root,
                restored: 0,
                reattached: false,
            });
        }

        let destination = match root.parent_id {
            Some(pid) if lock_live_folder(&mut tx, owner, pid).await? => Some(pid),
            _ => None,
        };
        let reattached = root.parent_id.is_some() && destination.is_none();

        let result = sqlx::query(
            "WITH RECURSIVE sub AS ( \
                SELECT id FROM nodes WHERE id = $1 \
                UNION ALL \
                SELECT n.id FROM nodes n INNER JOIN sub s ON n.parent_id = s.id \
                WHERE n.is_binned AND n.binned_at = $2 \
             ) \
             UPDATE nodes SET is_binned = FALSE, binned_at = NULL, updated_at = $3, \
                parent_id = CASE WHEN id = $1 THEN $4 ELSE parent_id END \
             WHERE id IN (SELECT id FROM sub)",
        )
        .bind(id)
        .bind(root.binned_at)
        .bind(now)
        .bind(destination)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_node_write("Failed to restore subtree", &root.name, e))?;

        let restored_root = fetch_node(&mut tx, id, false)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?;
        commit(tx).await?;
        Ok(RestoreOutcome {
            root: restored_root,
            restored: result.rows_affected(),
            reattached,
        })
    }

    async fn delete_node(&self, id: NodeId) -> AppResult<Option<DeletedNode>> {
        let mut tx = self.begin().await?;
        let Some(row) = sqlx::query_as::<_, NodeRow>("DELETE FROM nodes WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_node_write("Failed to delete node", &id.to_string(), e))?
        else {
            return Ok(None);
        };
        let node = Node::try_from(row)?;

        let mut released = None;
        if let Some(file) = node.file() {
            let entry = sqlx::query_as::<_, ContentEntry>(
                "UPDATE content_index SET ref_count = ref_count - 1, updated_at = NOW() \
                 WHERE content_hash = $1 AND ref_count > 0 RETURNING *",
            )
            .bind(&file.content_hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx("Failed to release content reference", e))?;
            released = entry.filter(|e| !e.is_live());
        }
        commit(tx).await?;
        Ok(Some(DeletedNode { node, released }))
    }

    async fn children(&self, owner: OwnerId, parent: Option<NodeId>) -> AppResult<Vec<Node>> {
        let query = match parent {
            Some(pid) => sqlx::query_as::<_, NodeRow>(
                "SELECT * FROM nodes WHERE owner_id = $1 AND parent_id = $2",
            )
            .bind(owner)
            .bind(pid),
            None => sqlx::query_as::<_, NodeRow>(
                "SELECT * FROM nodes WHERE owner_id = $1 AND parent_id IS NULL",
            )
            .bind(owner),
        };
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to list children", e))?;
        into_nodes(rows)
    }

    async fn search(&self, owner: OwnerId, needle: &str) -> AppResult<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM nodes WHERE owner_id = $1 AND NOT is_binned \
             AND strpos(lower(name), lower($2)) > 0",
        )
        .bind(owner)
        .bind(needle)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to search nodes", e))?;
        into_nodes(rows)
    }

    async fn starred(&self, owner: OwnerId) -> AppResult<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM nodes WHERE owner_id = $1 AND is_starred AND NOT is_binned",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list starred nodes", e))?;
        into_nodes(rows)
    }

    async fn bin_roots(
        &self,
        owner: Option<OwnerId>,
        binned_before: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT n.* FROM nodes n LEFT JOIN nodes p ON p.id = n.parent_id \
             WHERE n.is_binned \
               AND ($1::uuid IS NULL OR n.owner_id = $1) \
               AND ($2::timestamptz IS NULL OR n.binned_at < $2) \
               AND (p.id IS NULL OR NOT p.is_binned)",
        )
        .bind(owner)
        .bind(binned_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to list bin", e))?;
        into_nodes(rows)
    }

    async fn count_for_owner(&self, owner: OwnerId) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM nodes WHERE owner_id = $1")
            .bind(owner)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx("Failed to count nodes", e))?;
        Ok(count.max(0) as u64)
    }

    async fn usage_bytes(&self, owner: OwnerId) -> AppResult<u64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM nodes \
             WHERE owner_id = $1 AND kind = 'file'",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx("Failed to sum storage usage", e))?;
        Ok(total.max(0) as u64)
    }
}
