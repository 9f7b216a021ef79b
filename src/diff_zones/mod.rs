//! Diff Zone Store
//!
//! Per-file ordered collections of pending diff regions. A file has a
//! [`DiffZone`] exactly while it has at least one pending region, so the set
//! of zones is the set of files with changes.
//!
//! Every status change goes through [`DiffZoneStore::accept_or_reject`] or
//! [`DiffZoneStore::accept_or_reject_diff`]; regions that reach a terminal
//! state leave the pending sequence and are handed back to the caller.

use crate::agents::AgentRegistry;
use crate::error::{CoordinatorError, Result};
use crate::events::{
    CoordinatorEvent, DiffAddedPayload, DiffRemovalReason, DiffRemovedPayload, EventBatch,
};
use crate::models::state_machine::transition_state;
use crate::models::{Behavior, DiffRange, DiffRegion, DiffStatus, DiffZone};
use crate::navigation::UriOrder;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct DiffZoneStore {
    zones: HashMap<String, DiffZone>,
    next_diff_seq: u64,
    next_zone_seq: u64,
}

impl DiffZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending region owned by `agent_id`.
    /// Fails with `UnknownAgent` if the owner is not registered.
    pub fn add_diff_region(
        &mut self,
        registry: &AgentRegistry,
        uri: &str,
        agent_id: &str,
        range: DiffRange,
        events: &mut EventBatch,
    ) -> Result<DiffRegion> {
        if !registry.contains(agent_id) {
            return Err(CoordinatorError::UnknownAgent(agent_id.to_string()));
        }

        let seq = self.next_diff_seq;
        self.next_diff_seq += 1;

        let region = DiffRegion {
            diff_id: uuid::Uuid::new_v4().to_string(),
            uri: uri.to_string(),
            agent_id: agent_id.to_string(),
            range,
            status: DiffStatus::Pending,
            seq,
            created_at: Utc::now(),
        };

        let next_zone_seq = &mut self.next_zone_seq;
        let zone = self.zones.entry(uri.to_string()).or_insert_with(|| {
            let first_touched = *next_zone_seq;
            *next_zone_seq += 1;
            log::debug!("[DiffZoneStore] Opening diff zone for {}", uri);
            DiffZone {
                uri: uri.to_string(),
                regions: Vec::new(),
                sorted_diff_ids: Vec::new(),
                first_touched,
            }
        });

        // New regions carry the highest seq, so they go after every equal start
        let position = zone
            .regions
            .partition_point(|r| r.range.start_line <= region.range.start_line);
        zone.regions.insert(position, region.clone());
        recompute_sorted_ids(zone);

        log::debug!(
            "[DiffZoneStore] Added diff {} for {} in {} (lines {}-{})",
            region.diff_id,
            agent_id,
            uri,
            range.start_line,
            range.end_line
        );
        events.push(CoordinatorEvent::DiffAdded(DiffAddedPayload {
            uri: uri.to_string(),
            diff_id: region.diff_id.clone(),
            agent_id: agent_id.to_string(),
            range,
        }));

        Ok(region)
    }

    /// Remove a region by id without a status change
    pub fn remove_diff_region(
        &mut self,
        uri: &str,
        diff_id: &str,
        events: &mut EventBatch,
    ) -> Option<DiffRegion> {
        self.take_matching(uri, |r| r.diff_id == diff_id, None, events)
            .into_iter()
            .next()
    }

    /// Transition pending regions in `uri` to the behavior's terminal state.
    /// With `agent_id` only that agent's regions are affected.
    pub fn accept_or_reject(
        &mut self,
        uri: &str,
        behavior: Behavior,
        agent_id: Option<&str>,
        events: &mut EventBatch,
    ) -> Vec<DiffRegion> {
        let taken = self.take_matching(
            uri,
            |r| agent_id.map_or(true, |id| r.agent_id == id),
            Some(behavior),
            events,
        );
        if !taken.is_empty() {
            log::debug!(
                "[DiffZoneStore] {} {} region(s) in {}{}",
                behavior,
                taken.len(),
                uri,
                agent_id
                    .map(|id| format!(" owned by {}", id))
                    .unwrap_or_default()
            );
        }
        taken
    }

    /// Transition a single pending region
    pub fn accept_or_reject_diff(
        &mut self,
        uri: &str,
        diff_id: &str,
        behavior: Behavior,
        events: &mut EventBatch,
    ) -> Option<DiffRegion> {
        self.take_matching(uri, |r| r.diff_id == diff_id, Some(behavior), events)
            .into_iter()
            .next()
    }

    /// Drop an unregistered owner's regions from bookkeeping without a status change
    pub fn discard_orphaned(
        &mut self,
        uri: &str,
        agent_id: &str,
        events: &mut EventBatch,
    ) -> Vec<DiffRegion> {
        let mut taken = Vec::new();
        let Some(zone) = self.zones.get_mut(uri) else {
            return taken;
        };

        zone.regions.retain(|r| {
            if r.agent_id == agent_id {
                taken.push(r.clone());
                false
            } else {
                true
            }
        });
        for region in &taken {
            events.push(CoordinatorEvent::DiffRemoved(DiffRemovedPayload {
                uri: uri.to_string(),
                diff_id: region.diff_id.clone(),
                agent_id: region.agent_id.clone(),
                reason: DiffRemovalReason::Orphaned,
            }));
        }
        self.finish_zone(uri);
        taken
    }

    /// Ids of pending regions an accept/reject with this filter would touch,
    /// in navigation order
    pub fn matching_diff_ids(&self, uri: &str, agent_id: Option<&str>) -> Vec<String> {
        self.zones
            .get(uri)
            .map(|zone| {
                zone.regions
                    .iter()
                    .filter(|r| agent_id.map_or(true, |id| r.agent_id == id))
                    .map(|r| r.diff_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn zone(&self, uri: &str) -> Option<&DiffZone> {
        self.zones.get(uri)
    }

    pub fn region(&self, uri: &str, diff_id: &str) -> Option<&DiffRegion> {
        self.zones
            .get(uri)
            .and_then(|zone| zone.regions.iter().find(|r| r.diff_id == diff_id))
    }

    /// Distinct owners of pending regions in `uri`
    pub fn owners(&self, uri: &str) -> BTreeSet<String> {
        self.zones
            .get(uri)
            .map(DiffZone::owners)
            .unwrap_or_default()
    }

    pub fn agent_has_pending(&self, agent_id: &str, uri: &str) -> bool {
        self.zones
            .get(uri)
            .map_or(false, |zone| zone.regions.iter().any(|r| r.agent_id == agent_id))
    }

    /// Files where `agent_id` owns pending regions, in first-touched order
    pub fn files_owned_by(&self, agent_id: &str) -> Vec<String> {
        let mut zones: Vec<&DiffZone> = self
            .zones
            .values()
            .filter(|zone| zone.regions.iter().any(|r| r.agent_id == agent_id))
            .collect();
        zones.sort_by_key(|zone| zone.first_touched);
        zones.into_iter().map(|zone| zone.uri.clone()).collect()
    }

    /// Number of pending regions owned by `agent_id` across all files
    pub fn pending_count_for(&self, agent_id: &str) -> usize {
        self.zones
            .values()
            .flat_map(|zone| zone.regions.iter())
            .filter(|r| r.agent_id == agent_id)
            .count()
    }

    /// Files with at least one pending region, in a deterministic order
    pub fn sorted_uris(&self, order: UriOrder) -> Vec<String> {
        let mut zones: Vec<&DiffZone> = self.zones.values().collect();
        match order {
            UriOrder::FirstTouched => zones.sort_by_key(|zone| zone.first_touched),
            UriOrder::Lexicographic => zones.sort_by(|a, b| a.uri.cmp(&b.uri)),
        }
        zones.into_iter().map(|zone| zone.uri.clone()).collect()
    }

    pub fn diff_count(&self, uri: &str) -> usize {
        self.zones.get(uri).map_or(0, DiffZone::len)
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    fn take_matching(
        &mut self,
        uri: &str,
        predicate: impl Fn(&DiffRegion) -> bool,
        behavior: Option<Behavior>,
        events: &mut EventBatch,
    ) -> Vec<DiffRegion> {
        let mut taken = Vec::new();
        let Some(zone) = self.zones.get_mut(uri) else {
            return taken;
        };

        let mut kept = Vec::with_capacity(zone.regions.len());
        for mut region in zone.regions.drain(..) {
            if !predicate(&region) {
                kept.push(region);
                continue;
            }

            let reason = match behavior {
                Some(behavior) => match transition_state(region.status, behavior) {
                    Ok(status) => {
                        region.status = status;
                        match status {
                            DiffStatus::Accepted => DiffRemovalReason::Accepted,
                            _ => DiffRemovalReason::Rejected,
                        }
                    }
                    Err(e) => {
                        // Only pending regions live in a zone
                        log::warn!("[DiffZoneStore] Skipping {}: {}", region.diff_id, e);
                        kept.push(region);
                        continue;
                    }
                },
                None => DiffRemovalReason::Removed,
            };

            events.push(CoordinatorEvent::DiffRemoved(DiffRemovedPayload {
                uri: uri.to_string(),
                diff_id: region.diff_id.clone(),
                agent_id: region.agent_id.clone(),
                reason,
            }));
            taken.push(region);
        }
        zone.regions = kept;

        self.finish_zone(uri);
        taken
    }

    /// Recompute derived ids, deleting the zone once it has no pending regions
    fn finish_zone(&mut self, uri: &str) {
        let empty = match self.zones.get_mut(uri) {
            Some(zone) => {
                recompute_sorted_ids(zone);
                zone.is_empty()
            }
            None => return,
        };
        if empty {
            self.zones.remove(uri);
            log::debug!("[DiffZoneStore] Closed diff zone for {}", uri);
        }
    }
}

fn recompute_sorted_ids(zone: &mut DiffZone) {
    zone.sorted_diff_ids = zone.regions.iter().map(|r| r.diff_id.clone()).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentMeta;

    fn setup(agents: &[&str]) -> (AgentRegistry, DiffZoneStore) {
        let mut registry = AgentRegistry::new();
        let mut events = EventBatch::new();
        for id in agents {
            registry
                .register(AgentMeta::new(*id, format!("t-{}", id)), &mut events)
                .unwrap();
        }
        (registry, DiffZoneStore::new())
    }

    #[test]
    fn test_add_requires_registered_agent() {
        let (registry, mut store) = setup(&[]);
        let mut events = EventBatch::new();
        let result = store
            .add_diff_region(&registry, "/a.txt", "ghost", DiffRange::new(1, 2), &mut events);
        assert!(matches!(result, Err(CoordinatorError::UnknownAgent(_))));
        assert!(store.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_regions_ordered_by_start_then_creation() {
        let (registry, mut store) = setup(&["x", "y"]);
        let mut events = EventBatch::new();

        let late = store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(20, 25), &mut events)
            .unwrap();
        let tie_first = store
            .add_diff_region(&registry, "/a.txt", "y", DiffRange::new(5, 6), &mut events)
            .unwrap();
        let early = store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(1, 3), &mut events)
            .unwrap();
        let tie_second = store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(5, 9), &mut events)
            .unwrap();

        let zone = store.zone("/a.txt").unwrap();
        assert_eq!(
            zone.sorted_diff_ids,
            vec![
                early.diff_id,
                tie_first.diff_id,
                tie_second.diff_id,
                late.diff_id
            ]
        );
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_removing_last_region_deletes_zone() {
        let (registry, mut store) = setup(&["x"]);
        let mut events = EventBatch::new();
        let region = store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(1, 1), &mut events)
            .unwrap();

        let removed = store.remove_diff_region("/a.txt", &region.diff_id, &mut events).unwrap();
        assert_eq!(removed.status, DiffStatus::Pending);
        assert!(store.zone("/a.txt").is_none());
        assert!(store.sorted_uris(UriOrder::FirstTouched).is_empty());
        assert!(store.remove_diff_region("/a.txt", &region.diff_id, &mut events).is_none());
    }

    #[test]
    fn test_accept_or_reject_with_agent_filter() {
        let (registry, mut store) = setup(&["x", "y"]);
        let mut events = EventBatch::new();
        store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(1, 2), &mut events).unwrap();
        store
            .add_diff_region(&registry, "/a.txt", "y", DiffRange::new(4, 5), &mut events).unwrap();
        store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(8, 9), &mut events).unwrap();

        let accepted = store.accept_or_reject("/a.txt", Behavior::Accept, Some("x"), &mut events);
        assert_eq!(accepted.len(), 2);
        assert!(accepted.iter().all(|r| r.status == DiffStatus::Accepted));
        assert_eq!(store.owners("/a.txt"), BTreeSet::from(["y".to_string()]));

        let rejected = store.accept_or_reject("/a.txt", Behavior::Reject, None, &mut events);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].status, DiffStatus::Rejected);
        assert!(store.zone("/a.txt").is_none());
    }

    #[test]
    fn test_accept_single_diff() {
        let (registry, mut store) = setup(&["x"]);
        let mut events = EventBatch::new();
        let first = store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(1, 2), &mut events).unwrap();
        let second = store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(3, 4), &mut events).unwrap();

        let accepted = store
            .accept_or_reject_diff("/a.txt", &first.diff_id, Behavior::Accept, &mut events)
            .unwrap();
        assert_eq!(accepted.status, DiffStatus::Accepted);
        assert_eq!(store.zone("/a.txt").unwrap().sorted_diff_ids, vec![second.diff_id]);
        assert!(store
            .accept_or_reject_diff("/a.txt", &first.diff_id, Behavior::Accept, &mut events)
            .is_none());
    }

    #[test]
    fn test_removal_events_carry_reason() {
        let (registry, mut store) = setup(&["x"]);
        let mut events = EventBatch::new();
        store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(1, 2), &mut events).unwrap();
        let mut batch = EventBatch::new();

        store.accept_or_reject("/a.txt", Behavior::Reject, None, &mut batch);

        assert!(matches!(
            batch.iter().next(),
            Some(CoordinatorEvent::DiffRemoved(p)) if p.reason == DiffRemovalReason::Rejected
        ));
    }

    #[test]
    fn test_discard_orphaned_keeps_other_owners() {
        let (registry, mut store) = setup(&["x", "y"]);
        let mut events = EventBatch::new();
        store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(1, 2), &mut events).unwrap();
        store
            .add_diff_region(&registry, "/a.txt", "y", DiffRange::new(1, 2), &mut events).unwrap();

        let mut batch = EventBatch::new();
        let discarded = store.discard_orphaned("/a.txt", "x", &mut batch);
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].status, DiffStatus::Pending);
        assert_eq!(store.diff_count("/a.txt"), 1);
        assert!(matches!(
            batch.iter().next(),
            Some(CoordinatorEvent::DiffRemoved(p)) if p.reason == DiffRemovalReason::Orphaned
        ));
    }

    #[test]
    fn test_sorted_uris_orders() {
        let (registry, mut store) = setup(&["x"]);
        let mut events = EventBatch::new();
        for uri in ["/c.txt", "/a.txt", "/b.txt"] {
            store
                .add_diff_region(&registry, uri, "x", DiffRange::new(1, 1), &mut events).unwrap();
        }

        assert_eq!(
            store.sorted_uris(UriOrder::FirstTouched),
            vec!["/c.txt", "/a.txt", "/b.txt"]
        );
        assert_eq!(
            store.sorted_uris(UriOrder::Lexicographic),
            vec!["/a.txt", "/b.txt", "/c.txt"]
        );
        assert_eq!(store.files_owned_by("x"), vec!["/c.txt", "/a.txt", "/b.txt"]);
        assert_eq!(store.pending_count_for("x"), 3);
    }

    #[test]
    fn test_reopened_file_moves_to_end_of_first_touched_order() {
        let (registry, mut store) = setup(&["x"]);
        let mut events = EventBatch::new();
        store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(1, 1), &mut events).unwrap();
        store
            .add_diff_region(&registry, "/b.txt", "x", DiffRange::new(1, 1), &mut events).unwrap();

        store.accept_or_reject("/a.txt", Behavior::Accept, None, &mut events);
        store
            .add_diff_region(&registry, "/a.txt", "x", DiffRange::new(2, 2), &mut events).unwrap();

        assert_eq!(store.sorted_uris(UriOrder::FirstTouched), vec!["/b.txt", "/a.txt"]);
    }
}
