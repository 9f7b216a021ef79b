// Conflict detection over the pending diff regions of each file

use crate::diff_zones::DiffZoneStore;
use crate::error::{CoordinatorError, Result};
use crate::events::{
    ConflictDetectedPayload, ConflictResolvedPayload, CoordinatorEvent, EventBatch,
};
use crate::models::{Conflict, ConflictResolution, ConflictStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// When two owners' pending regions in one file count as a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Two or more owners with pending regions in the same file
    #[default]
    SameFile,
    /// At least one pair of intersecting ranges from different owners
    RangeOverlap,
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictPolicy::SameFile => write!(f, "same_file"),
            ConflictPolicy::RangeOverlap => write!(f, "range_overlap"),
        }
    }
}

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Tracks at most one pending conflict per file.
///
/// Conflicts are raised and cleared by [`ConflictDetector::evaluate`], which
/// the coordinator runs for every file touched by a mutation. A clear records
/// the tag staged for that file, then any tag carried over from an earlier
/// mutation, or `Superseded` when neither exists.
#[derive(Debug)]
pub struct ConflictDetector {
    policy: ConflictPolicy,
    history_limit: usize,
    active: HashMap<String, Conflict>,
    staged: HashMap<String, ConflictResolution>,
    carried: HashMap<String, ConflictResolution>,
    history: VecDeque<Conflict>,
    next_detection: u64,
}

impl ConflictDetector {
    pub fn new(policy: ConflictPolicy, history_limit: usize) -> Self {
        Self {
            policy,
            history_limit,
            active: HashMap::new(),
            staged: HashMap::new(),
            carried: HashMap::new(),
            history: VecDeque::new(),
            next_detection: 0,
        }
    }

    /// Agents currently in conflict in `uri` under the configured policy.
    /// Empty unless at least two owners participate.
    pub fn participants(&self, store: &DiffZoneStore, uri: &str) -> BTreeSet<String> {
        let Some(zone) = store.zone(uri) else {
            return BTreeSet::new();
        };

        let participants = match self.policy {
            ConflictPolicy::SameFile => zone.owners(),
            ConflictPolicy::RangeOverlap => {
                let mut agents = BTreeSet::new();
                for (i, a) in zone.regions.iter().enumerate() {
                    for b in &zone.regions[i + 1..] {
                        if a.agent_id != b.agent_id && a.range.intersects(&b.range) {
                            agents.insert(a.agent_id.clone());
                            agents.insert(b.agent_id.clone());
                        }
                    }
                }
                agents
            }
        };

        if participants.len() >= 2 {
            participants
        } else {
            BTreeSet::new()
        }
    }

    /// Re-check one file and raise, update or clear its conflict
    pub fn evaluate(&mut self, store: &DiffZoneStore, uri: &str, events: &mut EventBatch) {
        let participants = self.participants(store, uri);
        let conflicted = !participants.is_empty();

        match self.active.get_mut(uri) {
            Some(conflict) if conflicted => {
                if conflict.conflicting_agents != participants {
                    log::debug!(
                        "[ConflictDetector] Participants in {} changed: {:?} -> {:?}",
                        uri,
                        conflict.conflicting_agents,
                        participants
                    );
                    conflict.conflicting_agents = participants;
                }
            }
            Some(_) => {
                let resolution = self
                    .staged
                    .remove(uri)
                    .or_else(|| self.carried.remove(uri))
                    .unwrap_or(ConflictResolution::Superseded);
                self.clear(uri, resolution, events);
            }
            None if conflicted => {
                let detection_seq = self.next_detection;
                self.next_detection += 1;

                log::info!(
                    "[ConflictDetector] Conflict detected in {} between {:?}",
                    uri,
                    participants
                );
                events.push(CoordinatorEvent::ConflictDetected(ConflictDetectedPayload {
                    uri: uri.to_string(),
                    conflicting_agents: participants.clone(),
                }));
                self.active.insert(
                    uri.to_string(),
                    Conflict {
                        uri: uri.to_string(),
                        conflicting_agents: participants,
                        status: ConflictStatus::Pending,
                        resolution: None,
                        detection_seq,
                        detected_at: Utc::now(),
                        resolved_at: None,
                    },
                );
            }
            None => {}
        }
    }

    /// Evaluate every file touched by the batch
    pub fn observe(&mut self, store: &DiffZoneStore, events: &mut EventBatch) {
        for uri in events.touched_uris() {
            self.evaluate(store, &uri, events);
        }
    }

    /// Record the tag the next automatic clear of `uri` should carry
    pub fn stage_resolution(&mut self, uri: &str, resolution: ConflictResolution) {
        self.staged.insert(uri.to_string(), resolution);
    }

    /// Keep a tag for `uri` across mutations until its conflict clears
    pub fn carry_resolution(&mut self, uri: &str, resolution: ConflictResolution) {
        self.carried.insert(uri.to_string(), resolution);
    }

    /// Forget staged tags that no clear consumed. Carried tags survive.
    pub fn clear_staged(&mut self) {
        self.staged.clear();
    }

    /// Label a conflict as resolved without touching any diff.
    ///
    /// Fails with `ConflictResolutionMismatch` while the file is still
    /// conflicted; the conflict stays pending. When the conflict was already
    /// cleared as `Superseded` by the accept/reject that settled it, the
    /// newest history record for `uri` is relabelled instead. Returns
    /// `Ok(false)` when there is nothing to label.
    pub fn resolve(
        &mut self,
        store: &DiffZoneStore,
        uri: &str,
        resolution: ConflictResolution,
        events: &mut EventBatch,
    ) -> Result<bool> {
        let participants = self.participants(store, uri);
        if !participants.is_empty() {
            log::warn!(
                "[ConflictDetector] Refusing to resolve {} as {}: {:?} still have pending changes",
                uri,
                resolution,
                participants
            );
            return Err(CoordinatorError::ConflictResolutionMismatch {
                uri: uri.to_string(),
                owners: participants.into_iter().collect(),
            });
        }

        if self.active.contains_key(uri) {
            self.clear(uri, resolution, events);
            return Ok(true);
        }

        if resolution == ConflictResolution::Superseded {
            return Ok(false);
        }
        let Some(record) = self.history.iter_mut().rev().find(|c| c.uri == uri) else {
            return Ok(false);
        };
        if record.resolution != Some(ConflictResolution::Superseded) {
            return Ok(false);
        }

        log::info!(
            "[ConflictDetector] Relabelled resolved conflict in {} as {}",
            uri,
            resolution
        );
        record.resolution = Some(resolution.clone());
        record.resolved_at = Some(Utc::now());
        events.push(CoordinatorEvent::ConflictResolved(ConflictResolvedPayload {
            uri: uri.to_string(),
            conflicting_agents: record.conflicting_agents.clone(),
            resolution,
        }));
        Ok(true)
    }

    /// Drop every record that still names `agent_id`
    pub fn purge_agent(&mut self, agent_id: &str) {
        let before = self.history.len();
        self.history
            .retain(|conflict| !conflict.conflicting_agents.contains(agent_id));
        if self.history.len() != before {
            log::debug!(
                "[ConflictDetector] Purged {} resolved conflict(s) naming {}",
                before - self.history.len(),
                agent_id
            );
        }
    }

    /// Pending conflicts in detection order
    pub fn active_conflicts(&self) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = self.active.values().cloned().collect();
        conflicts.sort_by_key(|c| c.detection_seq);
        conflicts
    }

    /// The conflict to present first: the earliest detected still pending
    pub fn current_conflict(&self) -> Option<Conflict> {
        self.active
            .values()
            .min_by_key(|c| c.detection_seq)
            .cloned()
    }

    pub fn conflict_for(&self, uri: &str) -> Option<&Conflict> {
        self.active.get(uri)
    }

    /// Resolved conflicts, oldest first
    pub fn history(&self) -> Vec<Conflict> {
        self.history.iter().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn clear(&mut self, uri: &str, resolution: ConflictResolution, events: &mut EventBatch) {
        let Some(mut conflict) = self.active.remove(uri) else {
            return;
        };
        self.carried.remove(uri);

        log::info!("[ConflictDetector] Conflict in {} resolved as {}", uri, resolution);
        conflict.status = ConflictStatus::Resolved;
        conflict.resolution = Some(resolution.clone());
        conflict.resolved_at = Some(Utc::now());

        events.push(CoordinatorEvent::ConflictResolved(ConflictResolvedPayload {
            uri: uri.to_string(),
            conflicting_agents: conflict.conflicting_agents.clone(),
            resolution,
        }));

        if self.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(conflict);
    }
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::new(ConflictPolicy::default(), DEFAULT_HISTORY_LIMIT)
    }
}
