//! Edit coordination engine
//!
//! [`EditCoordinator`] owns the agent registry, the diff zones, the conflict
//! detector and the navigation cursor behind one `RwLock`. Every mutation runs
//! as a single critical section:
//!
//! 1. the operation mutates the components and collects events in an
//!    [`EventBatch`],
//! 2. the conflict detector re-evaluates every file the batch touched,
//! 3. navigation cursors are reconciled against the new zones,
//! 4. events get their sequence numbers and are published, still under the
//!    lock, so delivery order always matches mutation order.
//!
//! Reads take the shared lock and return owned snapshots.

use crate::agents::{AgentRegistry, ColorPalette};
use crate::applier::{ApplyRequest, DiffApplier, NoopApplier};
use crate::config::CoordinatorConfig;
use crate::conflicts::ConflictDetector;
use crate::diff_zones::DiffZoneStore;
use crate::error::{CoordinatorError, Result};
use crate::event_bus::{EventBus, Subscription};
use crate::events::{CoordinatorEvent, EventBatch, EventCategory, EventEnvelope};
use crate::models::{
    Agent, AgentMeta, AgentStatus, Behavior, Conflict, ConflictResolution, DiffRange, DiffRegion,
    DiffZone, Direction, StreamState,
};
use crate::navigation::{next_index, NavigationSnapshot, NavigationState, UriOrder};
use crate::utils::{read_lock_recover, write_lock_recover};
use std::sync::{Arc, RwLock};

struct EngineState {
    registry: AgentRegistry,
    store: DiffZoneStore,
    detector: ConflictDetector,
    navigation: NavigationState,
    uri_order: UriOrder,
    last_event_seq: u64,
}

impl EngineState {
    fn sorted_uris(&self) -> Vec<String> {
        self.store.sorted_uris(self.uri_order)
    }

    fn navigation_snapshot(&self) -> NavigationSnapshot {
        self.navigation.snapshot(&self.sorted_uris(), &self.store)
    }

    /// Finish a mutation: conflicts, navigation, sequencing
    fn settle(
        &mut self,
        mut events: EventBatch,
        before: &NavigationSnapshot,
    ) -> Vec<EventEnvelope> {
        self.detector.observe(&self.store, &mut events);
        self.detector.clear_staged();

        let sorted_uris = self.sorted_uris();
        self.navigation.reconcile(&sorted_uris, &self.store);
        let after = self.navigation.snapshot(&sorted_uris, &self.store);
        if after != *before {
            events.push(CoordinatorEvent::NavigationChanged(after.to_payload()));
        }

        events
            .into_events()
            .into_iter()
            .map(|event| {
                self.last_event_seq += 1;
                EventEnvelope {
                    seq: self.last_event_seq,
                    event,
                }
            })
            .collect()
    }

    fn accept_or_reject_file(
        &mut self,
        applier: &dyn DiffApplier,
        uri: &str,
        behavior: Behavior,
        agent_id: Option<&str>,
        events: &mut EventBatch,
    ) -> Result<Vec<DiffRegion>> {
        if let Some(id) = agent_id {
            if !self.registry.contains(id) {
                return Err(CoordinatorError::UnknownAgent(id.to_string()));
            }
        }

        let diff_ids = self.store.matching_diff_ids(uri, agent_id);
        if diff_ids.is_empty() {
            return Ok(Vec::new());
        }

        apply(
            applier,
            &ApplyRequest {
                uri,
                agent_id,
                behavior,
                diff_ids: &diff_ids,
            },
        )?;

        let regions = self.store.accept_or_reject(uri, behavior, agent_id, events);
        self.release_files(&regions);
        Ok(regions)
    }

    /// Drop files from owners' modified sets once they hold no pending region there
    fn release_files(&mut self, regions: &[DiffRegion]) {
        for region in regions {
            if !self.registry.contains(&region.agent_id)
                || self.store.agent_has_pending(&region.agent_id, &region.uri)
            {
                continue;
            }
            if let Err(e) = self
                .registry
                .remove_modified_file(&region.agent_id, &region.uri)
            {
                log::warn!("[EditCoordinator] Could not release {}: {}", region.uri, e);
            }
        }
    }

    fn stream_state(&self, uri: &str) -> StreamState {
        let owners = self.store.owners(uri);
        if owners.is_empty() {
            return StreamState::IdleNoChanges;
        }
        let streaming = owners
            .iter()
            .filter_map(|id| self.registry.get(id))
            .any(Agent::is_working);
        if streaming {
            StreamState::Streaming
        } else {
            StreamState::IdleHasChanges
        }
    }
}

fn apply(applier: &dyn DiffApplier, request: &ApplyRequest<'_>) -> Result<()> {
    applier.apply(request).map_err(|source| {
        log::error!(
            "[EditCoordinator] Collaborator failed to {} {} region(s) in {}: {}",
            request.behavior,
            request.diff_ids.len(),
            request.uri,
            source
        );
        CoordinatorError::ApplyFailed {
            uri: request.uri.to_string(),
            source,
        }
    })
}

/// Explicitly constructed coordination engine. Share it with `Arc`.
pub struct EditCoordinator {
    state: RwLock<EngineState>,
    bus: EventBus,
    applier: Arc<dyn DiffApplier>,
}

impl EditCoordinator {
    pub fn new(config: &CoordinatorConfig, applier: Arc<dyn DiffApplier>) -> Self {
        log::info!(
            "[EditCoordinator] Starting with {} conflict policy, {} file order",
            config.conflicts.policy,
            config.navigation.uri_order
        );
        Self {
            state: RwLock::new(EngineState {
                registry: AgentRegistry::with_palette(ColorPalette::new(
                    config.agents.palette.clone(),
                )),
                store: DiffZoneStore::new(),
                detector: ConflictDetector::new(
                    config.conflicts.policy,
                    config.conflicts.history_limit,
                ),
                navigation: NavigationState::new(),
                uri_order: config.navigation.uri_order,
                last_event_seq: 0,
            }),
            bus: EventBus::new(),
            applier,
        }
    }

    /// Default config and a collaborator that always succeeds
    pub fn with_defaults() -> Self {
        Self::new(&CoordinatorConfig::default(), Arc::new(NoopApplier))
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut EngineState, &dyn DiffApplier, &mut EventBatch) -> T,
    ) -> T {
        let mut state = write_lock_recover(&self.state);
        let before = state.navigation_snapshot();
        let mut events = EventBatch::new();

        let result = op(&mut *state, self.applier.as_ref(), &mut events);

        let envelopes = state.settle(events, &before);
        self.bus.publish(&envelopes);
        result
    }

    fn read<T>(&self, op: impl FnOnce(&EngineState) -> T) -> T {
        let state = read_lock_recover(&self.state);
        op(&state)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn subscribe(&self, categories: &[EventCategory]) -> Subscription {
        self.bus.subscribe(categories)
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.bus.subscribe_all()
    }

    // =========================================================================
    // Agents
    // =========================================================================

    pub fn register_agent(&self, meta: AgentMeta) -> Result<Agent> {
        self.mutate(|state, _, events| state.registry.register(meta, events))
    }

    /// Remove an agent and everything that references it.
    ///
    /// Pending regions owned by the agent are rejected through the
    /// collaborator. If the collaborator refuses, the regions are still
    /// dropped and reported with reason `orphaned`. Unknown ids are a no-op.
    pub fn unregister_agent(&self, agent_id: &str) -> Option<Agent> {
        self.mutate(|state, applier, events| {
            if !state.registry.contains(agent_id) {
                log::debug!("[EditCoordinator] Agent {} already unregistered", agent_id);
                return None;
            }

            let files = state.store.files_owned_by(agent_id);
            let orphaned = state.store.pending_count_for(agent_id);
            let agent = state.registry.unregister(agent_id, orphaned, events)?;

            for uri in files {
                let diff_ids = state.store.matching_diff_ids(&uri, Some(agent_id));
                let request = ApplyRequest {
                    uri: &uri,
                    agent_id: Some(agent_id),
                    behavior: Behavior::Reject,
                    diff_ids: &diff_ids,
                };
                match apply(applier, &request) {
                    Ok(()) => {
                        state
                            .store
                            .accept_or_reject(&uri, Behavior::Reject, Some(agent_id), events);
                    }
                    Err(e) => {
                        log::warn!(
                            "[EditCoordinator] Dropping {} orphaned region(s) of {} in {}: {}",
                            diff_ids.len(),
                            agent_id,
                            uri,
                            e
                        );
                        state.store.discard_orphaned(&uri, agent_id, events);
                    }
                }
            }
            // Clear conflicts that only existed because of this agent before purging
            state.detector.observe(&state.store, events);
            state.detector.purge_agent(agent_id);

            Some(agent)
        })
    }

    /// Returns false when the agent is gone; that case is only logged
    pub fn update_agent_status(&self, agent_id: &str, status: AgentStatus) -> bool {
        self.mutate(|state, _, events| state.registry.update_status(agent_id, status, events))
    }

    pub fn add_modified_file(&self, agent_id: &str, uri: &str) -> Result<bool> {
        self.mutate(|state, _, events| state.registry.add_modified_file(agent_id, uri, events))
    }

    /// No-op returning false while the agent still has pending regions in `uri`
    pub fn remove_modified_file(&self, agent_id: &str, uri: &str) -> Result<bool> {
        self.mutate(|state, _, _| {
            if state.registry.contains(agent_id) && state.store.agent_has_pending(agent_id, uri) {
                log::debug!(
                    "[EditCoordinator] Keeping {} for {}: regions still pending",
                    uri,
                    agent_id
                );
                return Ok(false);
            }
            state.registry.remove_modified_file(agent_id, uri)
        })
    }

    pub fn agent(&self, agent_id: &str) -> Option<Agent> {
        self.read(|state| state.registry.get(agent_id).cloned())
    }

    pub fn agent_by_thread_id(&self, thread_id: &str) -> Option<Agent> {
        self.read(|state| state.registry.get_by_thread_id(thread_id).cloned())
    }

    /// All agents in registration order
    pub fn agents(&self) -> Vec<Agent> {
        self.read(|state| state.registry.list().into_iter().cloned().collect())
    }

    pub fn agents_modifying_file(&self, uri: &str) -> Vec<Agent> {
        self.read(|state| {
            state
                .registry
                .agents_modifying_file(uri)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    // =========================================================================
    // Diff regions
    // =========================================================================

    pub fn add_diff_region(
        &self,
        uri: &str,
        agent_id: &str,
        range: DiffRange,
    ) -> Result<DiffRegion> {
        self.mutate(|state, _, events| {
            let region = state
                .store
                .add_diff_region(&state.registry, uri, agent_id, range, events)?;
            state.registry.add_modified_file(agent_id, uri, events)?;
            Ok(region)
        })
    }

    /// Remove a region without accepting or rejecting it
    pub fn remove_diff_region(&self, uri: &str, diff_id: &str) -> Result<DiffRegion> {
        self.mutate(|state, _, events| {
            let region = state
                .store
                .remove_diff_region(uri, diff_id, events)
                .ok_or_else(|| CoordinatorError::UnknownDiff {
                    uri: uri.to_string(),
                    diff_id: diff_id.to_string(),
                })?;
            state.release_files(std::slice::from_ref(&region));
            Ok(region)
        })
    }

    /// Accept or reject the pending regions of one file, optionally only one
    /// agent's. Nothing transitions if the collaborator fails.
    pub fn accept_or_reject_file(
        &self,
        uri: &str,
        behavior: Behavior,
        agent_id: Option<&str>,
    ) -> Result<Vec<DiffRegion>> {
        self.mutate(|state, applier, events| {
            state.accept_or_reject_file(applier, uri, behavior, agent_id, events)
        })
    }

    pub fn accept_or_reject_diff(
        &self,
        uri: &str,
        diff_id: &str,
        behavior: Behavior,
    ) -> Result<DiffRegion> {
        self.mutate(|state, applier, events| {
            let unknown = || CoordinatorError::UnknownDiff {
                uri: uri.to_string(),
                diff_id: diff_id.to_string(),
            };
            let owner = state
                .store
                .region(uri, diff_id)
                .map(|r| r.agent_id.clone())
                .ok_or_else(unknown)?;

            let diff_ids = [diff_id.to_string()];
            apply(
                applier,
                &ApplyRequest {
                    uri,
                    agent_id: Some(&owner),
                    behavior,
                    diff_ids: &diff_ids,
                },
            )?;

            let region = state
                .store
                .accept_or_reject_diff(uri, diff_id, behavior, events)
                .ok_or_else(unknown)?;
            state.release_files(std::slice::from_ref(&region));
            Ok(region)
        })
    }

    /// Accept or reject every file with changes, starting at the current file
    /// and wrapping. Stops at the first collaborator failure; files already
    /// processed stay processed. Returns the number of regions settled.
    pub fn accept_or_reject_all_files(&self, behavior: Behavior) -> Result<usize> {
        self.mutate(|state, applier, events| {
            let uris = state.sorted_uris();
            if uris.is_empty() {
                return Ok(0);
            }
            let start = state
                .navigation
                .current_uri_idx()
                .unwrap_or(0)
                .min(uris.len() - 1);

            let mut settled = 0;
            for uri in uris[start..].iter().chain(uris[..start].iter()) {
                settled += state
                    .accept_or_reject_file(applier, uri, behavior, None, events)?
                    .len();
            }

            if state.store.is_empty() {
                state.navigation.clear();
            }
            log::info!(
                "[EditCoordinator] {} {} region(s) across {} file(s)",
                behavior,
                settled,
                uris.len()
            );
            Ok(settled)
        })
    }

    pub fn diff_zone(&self, uri: &str) -> Option<DiffZone> {
        self.read(|state| state.store.zone(uri).cloned())
    }

    /// Files with at least one pending region
    pub fn sorted_uris(&self) -> Vec<String> {
        self.read(EngineState::sorted_uris)
    }

    pub fn stream_state(&self, uri: &str) -> StreamState {
        self.read(|state| state.stream_state(uri))
    }

    /// Stream state of the file under the URI cursor
    pub fn current_stream_state(&self) -> StreamState {
        self.read(|state| match state.navigation.current_uri() {
            Some(uri) => state.stream_state(uri),
            None => StreamState::IdleNoChanges,
        })
    }

    // =========================================================================
    // Conflicts
    // =========================================================================

    /// Label the conflict in `uri` as resolved. Diffs are not touched; the
    /// caller must already have settled them, otherwise this fails with
    /// `ConflictResolutionMismatch` and the conflict stays pending.
    ///
    /// Settling the diffs clears the conflict as `Superseded`; a label given
    /// afterwards replaces that tag on the newest history record for `uri`.
    pub fn resolve_conflict(&self, uri: &str, resolution: ConflictResolution) -> Result<bool> {
        self.mutate(|state, _, events| {
            state.detector.resolve(&state.store, uri, resolution, events)
        })
    }

    /// Drive the diffs of a conflicted file to the outcome `resolution`
    /// names, then record it. Returns false when `uri` has no conflict.
    ///
    /// `ManualMerge` and `Superseded` touch no diffs and behave like
    /// [`EditCoordinator::resolve_conflict`].
    ///
    /// `AcceptOne` accepts the winner's regions and then rejects the rest.
    /// If the reject fails the accepted regions stay accepted and the error
    /// is returned; the `AcceptOne` tag is kept for the file and recorded
    /// whenever its conflict clears.
    pub fn apply_resolution(&self, uri: &str, resolution: ConflictResolution) -> Result<bool> {
        self.mutate(|state, applier, events| {
            let outcome = match &resolution {
                ConflictResolution::ManualMerge | ConflictResolution::Superseded => {
                    return state
                        .detector
                        .resolve(&state.store, uri, resolution.clone(), events);
                }
                _ if state.detector.conflict_for(uri).is_none() => return Ok(false),
                ConflictResolution::AcceptOne { agent_id } => {
                    if !state.registry.contains(agent_id) {
                        return Err(CoordinatorError::UnknownAgent(agent_id.clone()));
                    }
                    state.detector.stage_resolution(uri, resolution.clone());
                    state.accept_or_reject_file(
                        applier,
                        uri,
                        Behavior::Accept,
                        Some(agent_id),
                        events,
                    )?;
                    let rejected = state.accept_or_reject_file(
                        applier,
                        uri,
                        Behavior::Reject,
                        None,
                        events,
                    );
                    if rejected.is_err() {
                        state.detector.carry_resolution(uri, resolution.clone());
                    }
                    rejected
                }
                ConflictResolution::AcceptAll | ConflictResolution::RejectAll => {
                    let behavior = if resolution == ConflictResolution::AcceptAll {
                        Behavior::Accept
                    } else {
                        Behavior::Reject
                    };
                    state.detector.stage_resolution(uri, resolution.clone());
                    state.accept_or_reject_file(applier, uri, behavior, None, events)
                }
            };

            match outcome {
                Ok(_) => Ok(true),
                Err(e) => {
                    state.detector.clear_staged();
                    Err(e)
                }
            }
        })
    }

    /// Pending conflicts in detection order
    pub fn active_conflicts(&self) -> Vec<Conflict> {
        self.read(|state| state.detector.active_conflicts())
    }

    /// The one conflict to present: first detected, still pending
    pub fn current_conflict(&self) -> Option<Conflict> {
        self.read(|state| state.detector.current_conflict())
    }

    pub fn conflict_history(&self) -> Vec<Conflict> {
        self.read(|state| state.detector.history())
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn navigation(&self) -> NavigationSnapshot {
        self.read(EngineState::navigation_snapshot)
    }

    /// Index the diff cursor of the current file would move to
    pub fn next_diff_idx(&self, direction: Direction) -> Option<usize> {
        self.read(|state| {
            let uri = state.navigation.current_uri()?;
            next_index(
                state.navigation.diff_idx(uri),
                state.store.diff_count(uri),
                direction,
            )
        })
    }

    /// Index the URI cursor would move to
    pub fn next_uri_idx(&self, direction: Direction) -> Option<usize> {
        self.read(|state| {
            next_index(
                state.navigation.current_uri_idx(),
                state.sorted_uris().len(),
                direction,
            )
        })
    }

    /// Set the diff cursor of the current file, clamping into range
    pub fn go_to_diff_idx(&self, idx: usize) -> Option<usize> {
        self.mutate(|state, _, _| {
            let uri = state.navigation.current_uri()?.to_string();
            let len = state.store.diff_count(&uri);
            state.navigation.go_to_diff_idx(&uri, idx, len)
        })
    }

    /// Set the URI cursor, clamping into range
    pub fn go_to_uri_idx(&self, idx: usize) -> Option<usize> {
        self.mutate(|state, _, _| {
            let uris = state.sorted_uris();
            state.navigation.go_to_uri_idx(idx, &uris)
        })
    }

    /// Move the diff cursor one step with wraparound
    pub fn step_diff(&self, direction: Direction) -> Option<usize> {
        self.mutate(|state, _, _| {
            let uri = state.navigation.current_uri()?.to_string();
            let len = state.store.diff_count(&uri);
            let next = next_index(state.navigation.diff_idx(&uri), len, direction)?;
            state.navigation.go_to_diff_idx(&uri, next, len)
        })
    }

    /// Move the URI cursor one step with wraparound
    pub fn step_uri(&self, direction: Direction) -> Option<usize> {
        self.mutate(|state, _, _| {
            let uris = state.sorted_uris();
            let next = next_index(state.navigation.current_uri_idx(), uris.len(), direction)?;
            state.navigation.go_to_uri_idx(next, &uris)
        })
    }
}

impl Default for EditCoordinator {
    fn default() -> Self {
        Self::with_defaults()
    }
}
