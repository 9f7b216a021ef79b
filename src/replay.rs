//! Scripted replay of coordinator operations
//!
//! A script is a JSON document with a list of steps tagged by `op`. Steps run
//! in order against one coordinator; a failing step is recorded and the
//! replay carries on. Diff ids are generated at runtime, so steps address
//! regions by their index in the file's navigation order.

use crate::coordinator::EditCoordinator;
use crate::events::EventEnvelope;
use crate::models::{
    AgentMeta, AgentStatus, Behavior, Conflict, ConflictResolution, DiffRange, Direction,
};
use crate::navigation::NavigationSnapshot;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

/// Which cursor a `next` step moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorTarget {
    #[default]
    Uri,
    Diff,
}

fn default_direction() -> Direction {
    Direction::Forward
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ReplayStep {
    Register {
        agent_id: String,
        thread_id: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        status: Option<AgentStatus>,
    },
    Unregister {
        agent_id: String,
    },
    Status {
        agent_id: String,
        status: AgentStatus,
    },
    AddDiff {
        uri: String,
        agent_id: String,
        start_line: u32,
        end_line: u32,
    },
    /// Remove the region at `index` of the file's navigation order
    RemoveDiff {
        uri: String,
        index: usize,
    },
    Accept {
        uri: String,
        #[serde(default)]
        agent_id: Option<String>,
    },
    Reject {
        uri: String,
        #[serde(default)]
        agent_id: Option<String>,
    },
    AcceptAll,
    RejectAll,
    /// Drive the file's diffs to the named outcome
    Resolve {
        uri: String,
        resolution: ConflictResolution,
    },
    /// Label an already settled conflict
    Label {
        uri: String,
        resolution: ConflictResolution,
    },
    Next {
        #[serde(default)]
        target: CursorTarget,
        #[serde(default = "default_direction")]
        direction: Direction,
    },
    GoToUri {
        index: usize,
    },
    GoToDiff {
        index: usize,
    },
}

impl ReplayStep {
    pub fn name(&self) -> &'static str {
        match self {
            ReplayStep::Register { .. } => "register",
            ReplayStep::Unregister { .. } => "unregister",
            ReplayStep::Status { .. } => "status",
            ReplayStep::AddDiff { .. } => "addDiff",
            ReplayStep::RemoveDiff { .. } => "removeDiff",
            ReplayStep::Accept { .. } => "accept",
            ReplayStep::Reject { .. } => "reject",
            ReplayStep::AcceptAll => "acceptAll",
            ReplayStep::RejectAll => "rejectAll",
            ReplayStep::Resolve { .. } => "resolve",
            ReplayStep::Label { .. } => "label",
            ReplayStep::Next { .. } => "next",
            ReplayStep::GoToUri { .. } => "goToUri",
            ReplayStep::GoToDiff { .. } => "goToDiff",
        }
    }
}

/// A step that returned an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step: usize,
    pub op: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub events: Vec<EventEnvelope>,
    pub failures: Vec<StepFailure>,
    pub navigation: NavigationSnapshot,
    pub active_conflicts: Vec<Conflict>,
}

pub fn parse_script(contents: &str) -> Result<ReplayScript> {
    serde_json::from_str(contents).map_err(|e| anyhow!("Failed to parse replay script: {}", e))
}

pub fn load_script(path: &Path) -> Result<ReplayScript> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read replay script '{}': {}", path.display(), e))?;
    parse_script(&contents)
}

/// Run every step and collect the events they published
pub fn run_script(coordinator: &EditCoordinator, script: &ReplayScript) -> ReplayOutcome {
    let mut subscription = coordinator.subscribe_all();
    let mut failures = Vec::new();

    for (idx, step) in script.steps.iter().enumerate() {
        log::debug!("[Replay] Step {}: {}", idx, step.name());
        if let Err(e) = run_step(coordinator, step) {
            log::warn!("[Replay] Step {} ({}) failed: {}", idx, step.name(), e);
            failures.push(StepFailure {
                step: idx,
                op: step.name().to_string(),
                error: e.to_string(),
            });
        }
    }

    ReplayOutcome {
        events: subscription.drain(),
        failures,
        navigation: coordinator.navigation(),
        active_conflicts: coordinator.active_conflicts(),
    }
}

fn run_step(coordinator: &EditCoordinator, step: &ReplayStep) -> Result<()> {
    match step {
        ReplayStep::Register {
            agent_id,
            thread_id,
            color,
            status,
        } => {
            let mut meta = AgentMeta::new(agent_id.as_str(), thread_id.as_str());
            if let Some(color) = color {
                meta = meta.with_color(color.as_str());
            }
            if let Some(status) = status {
                meta = meta.with_status(*status);
            }
            coordinator.register_agent(meta)?;
        }
        ReplayStep::Unregister { agent_id } => {
            coordinator.unregister_agent(agent_id);
        }
        ReplayStep::Status { agent_id, status } => {
            coordinator.update_agent_status(agent_id, *status);
        }
        ReplayStep::AddDiff {
            uri,
            agent_id,
            start_line,
            end_line,
        } => {
            coordinator.add_diff_region(uri, agent_id, DiffRange::new(*start_line, *end_line))?;
        }
        ReplayStep::RemoveDiff { uri, index } => {
            let diff_id = coordinator
                .diff_zone(uri)
                .and_then(|zone| zone.sorted_diff_ids.get(*index).cloned())
                .ok_or_else(|| anyhow!("No diff at index {} in {}", index, uri))?;
            coordinator.remove_diff_region(uri, &diff_id)?;
        }
        ReplayStep::Accept { uri, agent_id } => {
            coordinator.accept_or_reject_file(uri, Behavior::Accept, agent_id.as_deref())?;
        }
        ReplayStep::Reject { uri, agent_id } => {
            coordinator.accept_or_reject_file(uri, Behavior::Reject, agent_id.as_deref())?;
        }
        ReplayStep::AcceptAll => {
            coordinator.accept_or_reject_all_files(Behavior::Accept)?;
        }
        ReplayStep::RejectAll => {
            coordinator.accept_or_reject_all_files(Behavior::Reject)?;
        }
        ReplayStep::Resolve { uri, resolution } => {
            coordinator.apply_resolution(uri, resolution.clone())?;
        }
        ReplayStep::Label { uri, resolution } => {
            coordinator.resolve_conflict(uri, resolution.clone())?;
        }
        ReplayStep::Next { target, direction } => {
            match target {
                CursorTarget::Uri => coordinator.step_uri(*direction),
                CursorTarget::Diff => coordinator.step_diff(*direction),
            };
        }
        ReplayStep::GoToUri { index } => {
            coordinator.go_to_uri_idx(*index);
        }
        ReplayStep::GoToDiff { index } => {
            coordinator.go_to_diff_idx(*index);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CoordinatorEvent;

    const SCENARIO: &str = r#"{
        "steps": [
            {"op": "register", "agentId": "x", "threadId": "t-x"},
            {"op": "register", "agentId": "y", "threadId": "t-y",
             "color": "pink", "status": "working"},
            {"op": "addDiff", "uri": "/a.txt", "agentId": "x", "startLine": 1, "endLine": 4},
            {"op": "addDiff", "uri": "/a.txt", "agentId": "y", "startLine": 3, "endLine": 8},
            {"op": "resolve", "uri": "/a.txt", "resolution": {"kind": "accept_one", "agentId": "x"}}
        ]
    }"#;

    #[test]
    fn test_parse_steps() {
        let script = parse_script(SCENARIO).unwrap();
        assert_eq!(script.steps.len(), 5);
        assert_eq!(
            script.steps[4],
            ReplayStep::Resolve {
                uri: "/a.txt".to_string(),
                resolution: ConflictResolution::AcceptOne {
                    agent_id: "x".to_string()
                },
            }
        );

        let next: ReplayStep = serde_json::from_str(r#"{"op": "next"}"#).unwrap();
        assert_eq!(
            next,
            ReplayStep::Next {
                target: CursorTarget::Uri,
                direction: Direction::Forward
            }
        );
    }

    #[test]
    fn test_run_conflict_scenario() {
        let coordinator = EditCoordinator::with_defaults();
        let outcome = run_script(&coordinator, &parse_script(SCENARIO).unwrap());

        assert!(outcome.failures.is_empty());
        assert!(outcome.active_conflicts.is_empty());
        assert!(outcome.navigation.sorted_uris.is_empty());
        assert_eq!(coordinator.agent("y").unwrap().status, AgentStatus::Working);

        let names: Vec<&str> = outcome.events.iter().map(|e| e.event.name()).collect();
        assert_eq!(names.iter().filter(|n| **n == "conflict:detected").count(), 1);
        assert_eq!(names.iter().filter(|n| **n == "conflict:resolved").count(), 1);
        assert!(outcome.events.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_failures_are_recorded_and_replay_continues() {
        let script = parse_script(
            r#"{"steps": [
                {"op": "addDiff", "uri": "/a.txt", "agentId": "ghost",
                 "startLine": 1, "endLine": 1},
                {"op": "removeDiff", "uri": "/a.txt", "index": 0},
                {"op": "register", "agentId": "x", "threadId": "t-x"}
            ]}"#,
        )
        .unwrap();

        let coordinator = EditCoordinator::with_defaults();
        let outcome = run_script(&coordinator, &script);

        let failed: Vec<usize> = outcome.failures.iter().map(|f| f.step).collect();
        assert_eq!(failed, vec![0, 1]);
        assert!(matches!(
            outcome.events.last().map(|e| &e.event),
            Some(CoordinatorEvent::AgentRegistered(_))
        ));
    }

    #[test]
    fn test_unknown_op_is_parse_error() {
        assert!(parse_script(r#"{"steps": [{"op": "explode"}]}"#).is_err());
    }
}
