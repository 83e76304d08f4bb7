//! Read-only path resolution over the node store.

use std::collections::HashSet;
use std::sync::Arc;

use drivehub_core::config::TreeConfig;
use drivehub_core::error::AppError;
use drivehub_core::types::NodeId;
use drivehub_database::store::NodeStore;
use drivehub_entity::node::{Breadcrumb, Node, NodeTree, TreeNode};

use crate::context::RequestContext;
use crate::node::service::sort_for_listing;

/// Builds node trees and breadcrumb trails.
#[derive(Debug, Clone)]
pub struct TreeService {
    /// Node store.
    nodes: Arc<dyn NodeStore>,
    /// Ceiling on ancestry walks.
    max_depth: usize,
}

impl TreeService {
    /// Creates a new tree service.
    pub fn new(nodes: Arc<dyn NodeStore>, tree: &TreeConfig) -> Self {
        Self {
            nodes,
            max_depth: tree.max_depth,
        }
    }

    /// The trail from the root level down to `id`, inclusive.
    ///
    /// With `include_binned` unset, a binned node anywhere on the trail is
    /// reported as `NotFound`.
    pub async fn breadcrumbs(
        &self,
        ctx: &RequestContext,
        id: NodeId,
        include_binned: bool,
    ) -> Result<Vec<Breadcrumb>, AppError> {
        let mut trail = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id);

        while let Some(current) = cursor {
            if !seen.insert(current) || trail.len() >= self.max_depth {
                return Err(AppError::internal(format!(
                    "Ancestry of {id} does not reach a root"
                )));
            }
            let node = self
                .nodes
                .get(current)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Node {current} not found")))?;
            ctx.require_owner(node.owner)?;
            if node.is_binned && !include_binned {
                return Err(AppError::not_found(format!("Node {current} is in the bin")));
            }
            trail.push(Breadcrumb::from(&node));
            cursor = node.parent_id;
        }

        trail.reverse();
        Ok(trail)
    }

    /// Materialises the live tree below `root` (or the caller's whole
    /// forest when `root` is None). Children are ordered folders first,
    /// then by name.
    pub async fn tree(
        &self,
        ctx: &RequestContext,
        root: Option<NodeId>,
    ) -> Result<NodeTree, AppError> {
        let tops: Vec<Node> = match root {
            Some(id) => {
                let node = self
                    .nodes
                    .get(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))?;
                ctx.require_owner(node.owner)?;
                if node.is_binned {
                    return Err(AppError::not_found(format!("Node {id} is in the bin")));
                }
                vec![node]
            }
            None => self.live_children(ctx, None).await?,
        };

        // Flatten depth-first into arena slots, then assemble bottom-up so
        // nothing recurses on tree depth.
        let mut slots: Vec<(Node, Vec<usize>)> = Vec::new();
        let mut top_slots = Vec::with_capacity(tops.len());
        let mut pending: Vec<(Node, Option<usize>)> =
            tops.into_iter().rev().map(|n| (n, None)).collect();

        while let Some((node, parent_slot)) = pending.pop() {
            let slot = slots.len();
            match parent_slot {
                Some(p) => slots[p].1.push(slot),
                None => top_slots.push(slot),
            }
            if node.is_folder() {
                let children = self.live_children(ctx, Some(node.id)).await?;
                pending.extend(children.into_iter().rev().map(|c| (c, Some(slot))));
            }
            slots.push((node, Vec::new()));
        }

        let total_nodes = slots.len() as u64;
        // Children always occupy higher slots than their parent.
        let mut built: Vec<Option<TreeNode>> = Vec::with_capacity(slots.len());
        built.resize_with(slots.len(), || None);
        for (slot, (node, child_slots)) in slots.into_iter().enumerate().rev() {
            let children = child_slots
                .into_iter()
                .filter_map(|c| built[c].take())
                .collect();
            built[slot] = Some(TreeNode { node, children });
        }

        let roots = top_slots
            .into_iter()
            .filter_map(|s| built[s].take())
            .collect();
        Ok(NodeTree { roots, total_nodes })
    }

    async fn live_children(
        &self,
        ctx: &RequestContext,
        parent: Option<NodeId>,
    ) -> Result<Vec<Node>, AppError> {
        let mut children: Vec<Node> = self
            .nodes
            .children(ctx.owner, parent)
            .await?
            .into_iter()
            .filter(|n| !n.is_binned)
            .collect();
        sort_for_listing(&mut children);
        Ok(children)
    }
}
