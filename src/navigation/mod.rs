//! Global navigation cursor
//!
//! The URI cursor indexes into the sorted list of files with changes and each
//! file keeps its own cursor into its `sorted_diff_ids`. Indices are never
//! trusted: every lookup clamps into range, and [`NavigationState::reconcile`]
//! re-derives cursors after each mutation of the diff zones.

use crate::diff_zones::DiffZoneStore;
use crate::events::NavigationChangedPayload;
use crate::models::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Order of `sorted_uris`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriOrder {
    /// Order in which each file's diff zone was opened
    #[default]
    FirstTouched,
    Lexicographic,
}

impl std::fmt::Display for UriOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UriOrder::FirstTouched => write!(f, "first_touched"),
            UriOrder::Lexicographic => write!(f, "lexicographic"),
        }
    }
}

/// Next index in a cycle of `len` entries, wrapping at both ends.
/// `None` only when there is nothing to navigate.
pub fn next_index(current: Option<usize>, len: usize, direction: Direction) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let next = match (current.map(|i| i.min(len - 1)), direction) {
        (None, Direction::Forward) => 0,
        (None, Direction::Backward) => len - 1,
        (Some(i), Direction::Forward) => (i + 1) % len,
        (Some(i), Direction::Backward) => (i + len - 1) % len,
    };
    Some(next)
}

pub fn clamp_index(idx: usize, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(idx.min(len - 1))
    }
}

/// Point-in-time view of the navigation state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationSnapshot {
    pub sorted_uris: Vec<String>,
    pub current_uri_idx: Option<usize>,
    pub current_uri: Option<String>,
    /// Cursor per file with changes
    pub diff_idx: BTreeMap<String, usize>,
    pub current_diff_idx: Option<usize>,
    pub current_diff_id: Option<String>,
}

impl NavigationSnapshot {
    pub fn to_payload(&self) -> NavigationChangedPayload {
        NavigationChangedPayload {
            current_uri_idx: self.current_uri_idx,
            current_uri: self.current_uri.clone(),
            diff_idx: self.current_diff_idx,
            file_count: self.sorted_uris.len(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NavigationState {
    current_uri_idx: Option<usize>,
    /// File the URI cursor pointed at after the last reconcile
    current_uri: Option<String>,
    diff_idx: HashMap<String, usize>,
}

impl NavigationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-derive cursors against the current zones.
    ///
    /// Cursors of vanished files are dropped, per-file cursors are clamped to
    /// their shrunk sequence and new files start at 0. The URI cursor follows
    /// its file when it is still present, otherwise it is clamped.
    pub fn reconcile(&mut self, sorted_uris: &[String], store: &DiffZoneStore) {
        self.diff_idx.retain(|uri, _| store.zone(uri).is_some());
        for uri in sorted_uris {
            let len = store.diff_count(uri);
            let idx = self.diff_idx.entry(uri.clone()).or_insert(0);
            *idx = (*idx).min(len.saturating_sub(1));
        }

        let followed = self
            .current_uri
            .as_ref()
            .and_then(|uri| sorted_uris.iter().position(|u| u == uri));
        self.current_uri_idx = match (followed, self.current_uri_idx) {
            (Some(idx), _) => Some(idx),
            (None, Some(idx)) => clamp_index(idx, sorted_uris.len()),
            (None, None) => clamp_index(0, sorted_uris.len()),
        };
        self.current_uri = self
            .current_uri_idx
            .and_then(|idx| sorted_uris.get(idx).cloned());
    }

    pub fn current_uri_idx(&self) -> Option<usize> {
        self.current_uri_idx
    }

    pub fn current_uri(&self) -> Option<&str> {
        self.current_uri.as_deref()
    }

    pub fn diff_idx(&self, uri: &str) -> Option<usize> {
        self.diff_idx.get(uri).copied()
    }

    /// Move the URI cursor, clamping stale indices
    pub fn go_to_uri_idx(&mut self, idx: usize, sorted_uris: &[String]) -> Option<usize> {
        let clamped = clamp_index(idx, sorted_uris.len());
        if clamped != Some(idx) {
            log::debug!(
                "[Navigation] Clamped stale uri index {} to {:?} ({} files)",
                idx,
                clamped,
                sorted_uris.len()
            );
        }
        self.current_uri_idx = clamped;
        self.current_uri = clamped.and_then(|i| sorted_uris.get(i).cloned());
        clamped
    }

    /// Move the diff cursor inside `uri`, clamping stale indices
    pub fn go_to_diff_idx(&mut self, uri: &str, idx: usize, len: usize) -> Option<usize> {
        let clamped = clamp_index(idx, len);
        if clamped != Some(idx) {
            log::debug!(
                "[Navigation] Clamped stale diff index {} in {} to {:?}",
                idx,
                uri,
                clamped
            );
        }
        match clamped {
            Some(i) => {
                self.diff_idx.insert(uri.to_string(), i);
            }
            None => {
                self.diff_idx.remove(uri);
            }
        }
        clamped
    }

    pub fn clear(&mut self) {
        self.current_uri_idx = None;
        self.current_uri = None;
        self.diff_idx.clear();
    }

    pub fn snapshot(&self, sorted_uris: &[String], store: &DiffZoneStore) -> NavigationSnapshot {
        let current_uri = self
            .current_uri_idx
            .and_then(|idx| sorted_uris.get(idx).cloned());
        let current_diff_idx = current_uri.as_deref().and_then(|uri| {
            self.diff_idx(uri)
                .and_then(|i| clamp_index(i, store.diff_count(uri)))
        });
        let current_diff_id = match (current_uri.as_deref(), current_diff_idx) {
            (Some(uri), Some(idx)) => store
                .zone(uri)
                .and_then(|zone| zone.sorted_diff_ids.get(idx).cloned()),
            _ => None,
        };

        NavigationSnapshot {
            sorted_uris: sorted_uris.to_vec(),
            current_uri_idx: self.current_uri_idx,
            current_uri,
            diff_idx: sorted_uris
                .iter()
                .filter_map(|uri| self.diff_idx(uri).map(|idx| (uri.clone(), idx)))
                .collect(),
            current_diff_idx,
            current_diff_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRegistry;
    use crate::events::EventBatch;
    use crate::models::{AgentMeta, Behavior, DiffRange};

    fn store_with(files: &[(&str, usize)]) -> (AgentRegistry, DiffZoneStore) {
        let mut registry = AgentRegistry::new();
        let mut events = EventBatch::new();
        registry.register(AgentMeta::new("x", "t-x"), &mut events).unwrap();
        let mut store = DiffZoneStore::new();
        for (uri, count) in files {
            for line in 0..*count {
                let range = DiffRange::line(line as u32 + 1);
                store
                    .add_diff_region(&registry, uri, "x", range, &mut events)
                    .unwrap();
            }
        }
        (registry, store)
    }

    #[test]
    fn test_next_index_wraps_both_ways() {
        assert_eq!(next_index(Some(2), 3, Direction::Forward), Some(0));
        assert_eq!(next_index(Some(0), 3, Direction::Backward), Some(2));
        assert_eq!(next_index(None, 3, Direction::Forward), Some(0));
        assert_eq!(next_index(None, 3, Direction::Backward), Some(2));
        assert_eq!(next_index(Some(0), 0, Direction::Forward), None);
    }

    #[test]
    fn test_next_index_cycle_returns_to_start() {
        for len in 1..6 {
            let mut idx = Some(0);
            for _ in 0..len {
                idx = next_index(idx, len, Direction::Forward);
            }
            assert_eq!(idx, Some(0), "cycle of {}", len);
        }
    }

    #[test]
    fn test_next_index_clamps_stale_current() {
        assert_eq!(next_index(Some(10), 3, Direction::Forward), Some(0));
        assert_eq!(next_index(Some(10), 3, Direction::Backward), Some(1));
    }

    #[test]
    fn test_reconcile_starts_new_files_at_zero() {
        let (_registry, store) = store_with(&[("/a.txt", 2), ("/b.txt", 1)]);
        let uris = store.sorted_uris(UriOrder::FirstTouched);
        let mut nav = NavigationState::new();
        nav.reconcile(&uris, &store);

        assert_eq!(nav.current_uri_idx(), Some(0));
        assert_eq!(nav.current_uri(), Some("/a.txt"));
        assert_eq!(nav.diff_idx("/b.txt"), Some(0));
    }

    #[test]
    fn test_reconcile_clamps_shrunk_sequence() {
        let (_registry, mut store) = store_with(&[("/a.txt", 3)]);
        let uris = store.sorted_uris(UriOrder::FirstTouched);
        let mut nav = NavigationState::new();
        nav.reconcile(&uris, &store);
        nav.go_to_diff_idx("/a.txt", 2, 3);

        let last = store.zone("/a.txt").unwrap().sorted_diff_ids[2].clone();
        let mut events = EventBatch::new();
        store.accept_or_reject_diff("/a.txt", &last, Behavior::Accept, &mut events);
        nav.reconcile(&uris, &store);

        assert_eq!(nav.diff_idx("/a.txt"), Some(1));
    }

    #[test]
    fn test_reconcile_follows_current_file() {
        let (_registry, mut store) = store_with(&[("/a.txt", 1), ("/b.txt", 1), ("/c.txt", 1)]);
        let uris = store.sorted_uris(UriOrder::FirstTouched);
        let mut nav = NavigationState::new();
        nav.reconcile(&uris, &store);
        nav.go_to_uri_idx(2, &uris);

        let mut events = EventBatch::new();
        store.accept_or_reject("/a.txt", Behavior::Accept, None, &mut events);
        let uris = store.sorted_uris(UriOrder::FirstTouched);
        nav.reconcile(&uris, &store);

        assert_eq!(nav.current_uri(), Some("/c.txt"));
        assert_eq!(nav.current_uri_idx(), Some(1));
        assert_eq!(nav.diff_idx("/a.txt"), None);
    }

    #[test]
    fn test_reconcile_empties_cursor() {
        let (_registry, mut store) = store_with(&[("/a.txt", 1)]);
        let uris = store.sorted_uris(UriOrder::FirstTouched);
        let mut nav = NavigationState::new();
        nav.reconcile(&uris, &store);

        let mut events = EventBatch::new();
        store.accept_or_reject("/a.txt", Behavior::Reject, None, &mut events);
        nav.reconcile(&[], &store);

        assert_eq!(nav.current_uri_idx(), None);
        assert_eq!(nav.snapshot(&[], &store), NavigationSnapshot::default());
    }

    #[test]
    fn test_go_to_clamps_out_of_range() {
        let uris = vec!["/a.txt".to_string(), "/b.txt".to_string()];
        let mut nav = NavigationState::new();
        assert_eq!(nav.go_to_uri_idx(7, &uris), Some(1));
        assert_eq!(nav.current_uri(), Some("/b.txt"));
        assert_eq!(nav.go_to_diff_idx("/b.txt", 9, 4), Some(3));
        assert_eq!(nav.go_to_diff_idx("/b.txt", 0, 0), None);
    }

    #[test]
    fn test_snapshot_reports_current_diff() {
        let (_registry, store) = store_with(&[("/a.txt", 2)]);
        let uris = store.sorted_uris(UriOrder::FirstTouched);
        let mut nav = NavigationState::new();
        nav.reconcile(&uris, &store);
        nav.go_to_diff_idx("/a.txt", 1, 2);

        let snapshot = nav.snapshot(&uris, &store);
        assert_eq!(snapshot.current_diff_idx, Some(1));
        assert_eq!(
            snapshot.current_diff_id.as_deref(),
            Some(store.zone("/a.txt").unwrap().sorted_diff_ids[1].as_str())
        );
        assert_eq!(snapshot.to_payload().file_count, 1);
    }
}
