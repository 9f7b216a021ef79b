// Error taxonomy for coordinator operations

use crate::applier::ApplyError;
use thiserror::Error;

/// Which identity collided on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    AgentId,
    ThreadId,
}

impl std::fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateKind::AgentId => write!(f, "agent id"),
            DuplicateKind::ThreadId => write!(f, "thread id"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Duplicate {kind}: {value}")]
    DuplicateAgent { kind: DuplicateKind, value: String },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unknown diff {diff_id} in {uri}")]
    UnknownDiff { uri: String, diff_id: String },

    #[error("Conflict in {uri} still has pending changes from {owners:?}")]
    ConflictResolutionMismatch { uri: String, owners: Vec<String> },

    #[error("Failed to apply changes to {uri}: {source}")]
    ApplyFailed {
        uri: String,
        #[source]
        source: ApplyError,
    },
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
