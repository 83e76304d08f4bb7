//! Tree and breadcrumb shapes produced by path resolution.

use drivehub_core::types::NodeId;
use serde::{Deserialize, Serialize};

use super::model::Node;

/// One ancestor in a breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    /// Ancestor id.
    pub id: NodeId,
    /// Ancestor name.
    pub name: String,
}

impl From<&Node> for Breadcrumb {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
        }
    }
}

/// A node with its materialised children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    /// The node itself.
    pub node: Node,
    /// Child nodes, folders first then by name.
    pub children: Vec<TreeNode>,
}

/// A materialised forest below a root (or an owner's whole forest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTree {
    /// The top-level nodes of the tree.
    pub roots: Vec<TreeNode>,
    /// Total number of nodes in the tree.
    pub total_nodes: u64,
}

impl NodeTree {
    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            roots: Vec::new(),
            total_nodes: 0,
        }
    }
}
