// Event types and payload structures for coordinator state changes
// These are fanned out to subscribers through the EventBus

use crate::models::{AgentStatus, ConflictResolution, DiffRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// Event name constants
pub const EVENT_AGENT_REGISTERED: &str = "agent:registered";
pub const EVENT_AGENT_UNREGISTERED: &str = "agent:unregistered";
pub const EVENT_AGENT_STATUS_CHANGED: &str = "agent:status_changed";
pub const EVENT_AGENT_FILE_MODIFIED: &str = "agent:file_modified";

pub const EVENT_DIFF_ADDED: &str = "diff:added";
pub const EVENT_DIFF_REMOVED: &str = "diff:removed";

pub const EVENT_CONFLICT_DETECTED: &str = "conflict:detected";
pub const EVENT_CONFLICT_RESOLVED: &str = "conflict:resolved";

pub const EVENT_NAVIGATION_CHANGED: &str = "navigation:changed";

/// Subscription category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Agent,
    Diff,
    Conflict,
    Navigation,
}

impl EventCategory {
    pub const ALL: [EventCategory; 4] = [
        EventCategory::Agent,
        EventCategory::Diff,
        EventCategory::Conflict,
        EventCategory::Navigation,
    ];
}

/// Payload for agent registered events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegisteredPayload {
    pub agent_id: String,
    pub thread_id: String,
    pub color: String,
    pub status: AgentStatus,
}

/// Payload for agent unregistered events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUnregisteredPayload {
    pub agent_id: String,
    pub thread_id: String,
    /// Pending regions that were cleaned up with the agent
    pub orphaned_diffs: usize,
}

/// Payload for agent status change events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusChangedPayload {
    pub agent_id: String,
    pub old_status: AgentStatus,
    pub new_status: AgentStatus,
}

/// Payload for file modified events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileModifiedPayload {
    pub agent_id: String,
    pub uri: String,
}

/// Payload for diff added events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffAddedPayload {
    pub uri: String,
    pub diff_id: String,
    pub agent_id: String,
    pub range: DiffRange,
}

/// Why a region left the pending sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffRemovalReason {
    /// Removed by id without a status change
    Removed,
    Accepted,
    Rejected,
    /// Owner unregistered and the collaborator could not reject the region
    Orphaned,
}

/// Payload for diff removed events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRemovedPayload {
    pub uri: String,
    pub diff_id: String,
    pub agent_id: String,
    pub reason: DiffRemovalReason,
}

/// Payload for conflict detected events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetectedPayload {
    pub uri: String,
    pub conflicting_agents: BTreeSet<String>,
}

/// Payload for conflict resolved events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolvedPayload {
    pub uri: String,
    pub conflicting_agents: BTreeSet<String>,
    pub resolution: ConflictResolution,
}

/// Payload for navigation changed events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationChangedPayload {
    pub current_uri_idx: Option<usize>,
    pub current_uri: Option<String>,
    /// Cursor inside the current file
    pub diff_idx: Option<usize>,
    pub file_count: usize,
}

/// Any state change published by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum CoordinatorEvent {
    #[serde(rename = "agent:registered")]
    AgentRegistered(AgentRegisteredPayload),
    #[serde(rename = "agent:unregistered")]
    AgentUnregistered(AgentUnregisteredPayload),
    #[serde(rename = "agent:status_changed")]
    AgentStatusChanged(AgentStatusChangedPayload),
    #[serde(rename = "agent:file_modified")]
    AgentFileModified(FileModifiedPayload),
    #[serde(rename = "diff:added")]
    DiffAdded(DiffAddedPayload),
    #[serde(rename = "diff:removed")]
    DiffRemoved(DiffRemovedPayload),
    #[serde(rename = "conflict:detected")]
    ConflictDetected(ConflictDetectedPayload),
    #[serde(rename = "conflict:resolved")]
    ConflictResolved(ConflictResolvedPayload),
    #[serde(rename = "navigation:changed")]
    NavigationChanged(NavigationChangedPayload),
}

impl CoordinatorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CoordinatorEvent::AgentRegistered(_) => EVENT_AGENT_REGISTERED,
            CoordinatorEvent::AgentUnregistered(_) => EVENT_AGENT_UNREGISTERED,
            CoordinatorEvent::AgentStatusChanged(_) => EVENT_AGENT_STATUS_CHANGED,
            CoordinatorEvent::AgentFileModified(_) => EVENT_AGENT_FILE_MODIFIED,
            CoordinatorEvent::DiffAdded(_) => EVENT_DIFF_ADDED,
            CoordinatorEvent::DiffRemoved(_) => EVENT_DIFF_REMOVED,
            CoordinatorEvent::ConflictDetected(_) => EVENT_CONFLICT_DETECTED,
            CoordinatorEvent::ConflictResolved(_) => EVENT_CONFLICT_RESOLVED,
            CoordinatorEvent::NavigationChanged(_) => EVENT_NAVIGATION_CHANGED,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            CoordinatorEvent::AgentRegistered(_)
            | CoordinatorEvent::AgentUnregistered(_)
            | CoordinatorEvent::AgentStatusChanged(_)
            | CoordinatorEvent::AgentFileModified(_) => EventCategory::Agent,
            CoordinatorEvent::DiffAdded(_) | CoordinatorEvent::DiffRemoved(_) => {
                EventCategory::Diff
            }
            CoordinatorEvent::ConflictDetected(_) | CoordinatorEvent::ConflictResolved(_) => {
                EventCategory::Conflict
            }
            CoordinatorEvent::NavigationChanged(_) => EventCategory::Navigation,
        }
    }

    /// File whose conflict state may have changed because of this event
    pub fn touched_uri(&self) -> Option<&str> {
        match self {
            CoordinatorEvent::AgentFileModified(p) => Some(&p.uri),
            CoordinatorEvent::DiffAdded(p) => Some(&p.uri),
            CoordinatorEvent::DiffRemoved(p) => Some(&p.uri),
            _ => None,
        }
    }
}

/// A published event with its position in the global mutation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub seq: u64,
    #[serde(flatten)]
    pub event: CoordinatorEvent,
}

/// Events produced by one mutation, in the order they happened
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    events: Vec<CoordinatorEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: CoordinatorEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoordinatorEvent> {
        self.events.iter()
    }

    /// Distinct files touched by the batch, in first-seen order
    pub fn touched_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = Vec::new();
        for event in &self.events {
            if let Some(uri) = event.touched_uri() {
                if !uris.iter().any(|u| u == uri) {
                    uris.push(uri.to_string());
                }
            }
        }
        uris
    }

    pub fn into_events(self) -> Vec<CoordinatorEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constants() {
        assert_eq!(EVENT_AGENT_REGISTERED, "agent:registered");
        assert_eq!(EVENT_AGENT_UNREGISTERED, "agent:unregistered");
        assert_eq!(EVENT_AGENT_STATUS_CHANGED, "agent:status_changed");
        assert_eq!(EVENT_DIFF_ADDED, "diff:added");
        assert_eq!(EVENT_CONFLICT_DETECTED, "conflict:detected");
        assert_eq!(EVENT_NAVIGATION_CHANGED, "navigation:changed");
    }

    #[test]
    fn test_event_serializes_with_name_and_payload() {
        let event = CoordinatorEvent::AgentStatusChanged(AgentStatusChangedPayload {
            agent_id: "agent-1".to_string(),
            old_status: AgentStatus::Idle,
            new_status: AgentStatus::Working,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"agent:status_changed\""));
        assert!(json.contains("\"agentId\":\"agent-1\""));
        assert!(json.contains("\"oldStatus\":\"idle\""));
        assert!(json.contains("\"newStatus\":\"working\""));
    }

    #[test]
    fn test_envelope_flattens_event() {
        let envelope = EventEnvelope {
            seq: 7,
            event: CoordinatorEvent::DiffRemoved(DiffRemovedPayload {
                uri: "/a.txt".to_string(),
                diff_id: "d1".to_string(),
                agent_id: "x".to_string(),
                reason: DiffRemovalReason::Accepted,
            }),
        };

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"seq\":7"));
        assert!(json.contains("\"event\":\"diff:removed\""));
        assert!(json.contains("\"reason\":\"accepted\""));

        let parsed: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_event_name_matches_serialized_tag() {
        let event = CoordinatorEvent::ConflictDetected(ConflictDetectedPayload {
            uri: "/a.txt".to_string(),
            conflicting_agents: ["x".to_string(), "y".to_string()].into_iter().collect(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.name());
        assert_eq!(event.category(), EventCategory::Conflict);
    }

    #[test]
    fn test_batch_touched_uris_are_distinct_and_ordered() {
        let mut batch = EventBatch::new();
        batch.push(CoordinatorEvent::AgentFileModified(FileModifiedPayload {
            agent_id: "x".to_string(),
            uri: "/b.txt".to_string(),
        }));
        batch.push(CoordinatorEvent::DiffAdded(DiffAddedPayload {
            uri: "/b.txt".to_string(),
            diff_id: "d1".to_string(),
            agent_id: "x".to_string(),
            range: DiffRange::new(1, 2),
        }));
        batch.push(CoordinatorEvent::DiffAdded(DiffAddedPayload {
            uri: "/a.txt".to_string(),
            diff_id: "d2".to_string(),
            agent_id: "x".to_string(),
            range: DiffRange::new(1, 2),
        }));

        assert_eq!(batch.touched_uris(), vec!["/b.txt", "/a.txt"]);
        assert_eq!(batch.len(), 3);
    }
}
