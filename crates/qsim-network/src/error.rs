//! Network error type.

use thiserror::Error;

use qsim_core::{LinkId, NodeId};

/// Errors produced by `qsim-network`.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("link {link} references unknown node {node}")]
    UnknownNode { link: LinkId, node: NodeId },

    #[error("link {link} is invalid: {reason}")]
    InvalidLink { link: LinkId, reason: String },

    #[error("link {0} not found in network")]
    LinkNotFound(LinkId),

    #[error("no route from {from} to {to}")]
    NoRoute { from: NodeId, to: NodeId },

    #[error("partitioning error: {0}")]
    Partition(String),

    #[error("network parse error: {0}")]
    Parse(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
