use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeError>;

/// Structural errors in a change-log tree handed over by a parser.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Root node {0} does not exist")]
    MissingRoot(NodeId),

    #[error("Node {node} refers to missing node {missing}")]
    DanglingNode { node: NodeId, missing: NodeId },

    #[error("Node {node} lists missing change-set #{index}")]
    DanglingChangeSet { node: NodeId, index: usize },

    #[error("Parameter '{name}' is owned by missing node {missing}")]
    DanglingParameterOwner { name: String, missing: NodeId },

    #[error("Parent chain of node {0} loops back on itself")]
    ParentCycle(NodeId),
}
