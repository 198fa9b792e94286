//! Testkit error types.

use crate::design::NodeId;

/// Errors raised by the design model when a write does not fit the target.
#[derive(Debug, thiserror::Error)]
pub enum TestkitError {
    #[error("node {0:?} does not exist")]
    NoSuchNode(NodeId),

    #[error("node {node:?} holds no value of kind {expected}")]
    KindMismatch { node: NodeId, expected: &'static str },

    #[error("value of width {got} written to node of width {width}")]
    WidthMismatch { got: usize, width: usize },

    #[error("'{0}' is not a logic character")]
    BadLogic(char),
}

pub type Result<T> = std::result::Result<T, TestkitError>;
