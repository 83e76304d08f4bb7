//! File and folder node entities.

pub mod model;
pub mod name;
pub mod tree;

pub use model::{FileContent, NewNode, Node, NodeKind};
pub use name::{normalize_name, validate_name};
pub use tree::{Breadcrumb, NodeTree, TreeNode};
