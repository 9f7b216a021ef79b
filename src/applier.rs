//! Diff application collaborator boundary
//!
//! The coordinator never touches file contents. Before a region reaches a
//! terminal state the coordinator asks a [`DiffApplier`] to perform the text
//! mutation; only when that call succeeds is the status transition recorded.

use crate::models::Behavior;
use crate::utils::lock_mutex_recover;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

/// Failure reported by the external diff application collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApplyError {
    pub message: String,
}

impl ApplyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What the collaborator is asked to do for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest<'a> {
    pub uri: &'a str,
    /// Owner filter, `None` when every owner's regions are included
    pub agent_id: Option<&'a str>,
    pub behavior: Behavior,
    /// Regions covered by this request, in navigation order
    pub diff_ids: &'a [String],
}

/// Performs the actual text mutation for accepted or rejected regions.
///
/// Called while the coordinator holds its write lock, so implementations must
/// not call back into the coordinator.
pub trait DiffApplier: Send + Sync {
    fn apply(&self, request: &ApplyRequest<'_>) -> Result<(), ApplyError>;
}

/// Collaborator that reports success without doing anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopApplier;

impl DiffApplier for NoopApplier {
    fn apply(&self, request: &ApplyRequest<'_>) -> Result<(), ApplyError> {
        log::trace!(
            "[NoopApplier] {} {} region(s) in {}",
            request.behavior,
            request.diff_ids.len(),
            request.uri
        );
        Ok(())
    }
}

/// One call observed by [`RecordingApplier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCall {
    pub uri: String,
    pub agent_id: Option<String>,
    pub behavior: Behavior,
    pub diff_ids: Vec<String>,
}

/// Collaborator that records every call and can be told to fail for given files
#[derive(Debug, Default)]
pub struct RecordingApplier {
    calls: Mutex<Vec<AppliedCall>>,
    failing_uris: Mutex<HashSet<String>>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call for `uri` fail
    pub fn fail_for(&self, uri: impl Into<String>) {
        lock_mutex_recover(&self.failing_uris).insert(uri.into());
    }

    /// Stop failing calls for `uri`
    pub fn recover(&self, uri: &str) {
        lock_mutex_recover(&self.failing_uris).remove(uri);
    }

    /// Successful calls, in order
    pub fn calls(&self) -> Vec<AppliedCall> {
        lock_mutex_recover(&self.calls).clone()
    }
}

impl DiffApplier for RecordingApplier {
    fn apply(&self, request: &ApplyRequest<'_>) -> Result<(), ApplyError> {
        if lock_mutex_recover(&self.failing_uris).contains(request.uri) {
            return Err(ApplyError::new(format!(
                "refused to {} changes in {}",
                request.behavior, request.uri
            )));
        }

        lock_mutex_recover(&self.calls).push(AppliedCall {
            uri: request.uri.to_string(),
            agent_id: request.agent_id.map(str::to_string),
            behavior: request.behavior,
            diff_ids: request.diff_ids.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_applier_succeeds() {
        let ids = vec!["d1".to_string()];
        let request = ApplyRequest {
            uri: "/a.txt",
            agent_id: None,
            behavior: Behavior::Accept,
            diff_ids: &ids,
        };
        assert!(NoopApplier.apply(&request).is_ok());
    }

    #[test]
    fn test_recording_applier_records_and_fails() {
        let applier = RecordingApplier::new();
        let ids = vec!["d1".to_string(), "d2".to_string()];
        let request = ApplyRequest {
            uri: "/a.txt",
            agent_id: Some("x"),
            behavior: Behavior::Reject,
            diff_ids: &ids,
        };

        applier.apply(&request).unwrap();
        assert_eq!(applier.calls().len(), 1);
        assert_eq!(applier.calls()[0].agent_id.as_deref(), Some("x"));

        applier.fail_for("/a.txt");
        let err = applier.apply(&request).unwrap_err();
        assert!(err.message.contains("/a.txt"));
        assert_eq!(applier.calls().len(), 1);

        applier.recover("/a.txt");
        assert!(applier.apply(&request).is_ok());
        assert_eq!(applier.calls().len(), 2);
    }
}
