// Data model shared by the registry, diff zone store, conflict detector and navigation

pub mod state_machine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// Agents
// =============================================================================

/// Lifecycle status of an editing agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered but not producing edits
    Idle,
    /// Actively streaming changes
    Working,
    /// Waiting for a human or policy decision
    AwaitingApproval,
    /// Suspended by the caller
    Paused,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Working => write!(f, "working"),
            AgentStatus::AwaitingApproval => write!(f, "awaiting_approval"),
            AgentStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Registration input for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMeta {
    pub agent_id: String,
    pub thread_id: String,
    /// Explicit color; when absent the next palette color is assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Initial status (defaults to idle)
    #[serde(default)]
    pub status: AgentStatus,
}

impl AgentMeta {
    pub fn new(agent_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            thread_id: thread_id.into(),
            color: None,
            status: AgentStatus::Idle,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }
}

/// A registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub agent_id: String,
    pub thread_id: String,
    pub status: AgentStatus,
    /// Files this agent has an open diff in
    pub modified_files: BTreeSet<String>,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Agent {
    pub fn is_working(&self) -> bool {
        self.status == AgentStatus::Working
    }
}

// =============================================================================
// Diff regions and zones
// =============================================================================

/// Inclusive, 1-based line span inside a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRange {
    pub start_line: u32,
    pub end_line: u32,
}

impl DiffRange {
    /// Build a range; a reversed span is normalised
    pub fn new(start_line: u32, end_line: u32) -> Self {
        if end_line < start_line {
            Self {
                start_line: end_line,
                end_line: start_line,
            }
        } else {
            Self {
                start_line,
                end_line,
            }
        }
    }

    pub fn line(line: u32) -> Self {
        Self::new(line, line)
    }

    pub fn intersects(&self, other: &DiffRange) -> bool {
        self.start_line <= other.end_line && other.start_line <= self.end_line
    }
}

/// Status of a diff region. Only `Pending` is mutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Pending,
    Accepted,
    Rejected,
}

impl Default for DiffStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffStatus::Pending => write!(f, "pending"),
            DiffStatus::Accepted => write!(f, "accepted"),
            DiffStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Accept or reject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Accept,
    Reject,
}

impl Behavior {
    /// Terminal status a region reaches under this behavior
    pub fn terminal_status(self) -> DiffStatus {
        match self {
            Behavior::Accept => DiffStatus::Accepted,
            Behavior::Reject => DiffStatus::Rejected,
        }
    }
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Behavior::Accept => write!(f, "accept"),
            Behavior::Reject => write!(f, "reject"),
        }
    }
}

/// A pending, owned, positioned candidate change to a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRegion {
    pub diff_id: String,
    pub uri: String,
    /// Owner; immutable once the region exists
    pub agent_id: String,
    pub range: DiffRange,
    pub status: DiffStatus,
    /// Creation order, used to break ties between equal range starts
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

/// All pending regions of one file, kept ordered by (range start, creation order)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffZone {
    pub uri: String,
    pub regions: Vec<DiffRegion>,
    pub sorted_diff_ids: Vec<String>,
    /// Order in which the file first gained a pending diff
    pub first_touched: u64,
}

impl DiffZone {
    pub fn owners(&self) -> BTreeSet<String> {
        self.regions.iter().map(|r| r.agent_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

// =============================================================================
// Conflicts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

/// How a conflict was (or should be) resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictResolution {
    /// One agent's regions win, all others are rejected
    AcceptOne {
        #[serde(rename = "agentId")]
        agent_id: String,
    },
    AcceptAll,
    RejectAll,
    /// The caller edits the file by hand and drives accept/reject itself
    ManualMerge,
    /// Cleared because the overlapping regions went away without an explicit tag
    Superseded,
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictResolution::AcceptOne { agent_id } => write!(f, "accept_one({})", agent_id),
            ConflictResolution::AcceptAll => write!(f, "accept_all"),
            ConflictResolution::RejectAll => write!(f, "reject_all"),
            ConflictResolution::ManualMerge => write!(f, "manual_merge"),
            ConflictResolution::Superseded => write!(f, "superseded"),
        }
    }
}

/// Detected overlap of pending changes from several agents in one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub uri: String,
    pub conflicting_agents: BTreeSet<String>,
    pub status: ConflictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
    /// Detection order, used for first-detected-first-shown presentation
    pub detection_seq: u64,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    pub fn is_pending(&self) -> bool {
        self.status == ConflictStatus::Pending
    }
}

// =============================================================================
// Navigation
// =============================================================================

/// Step direction for cursor movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// Derived liveness of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Streaming,
    IdleHasChanges,
    IdleNoChanges,
}
