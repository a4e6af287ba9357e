//! Escape request handling: out-of-workspace access that needs a decision.

use crate::boundaries::PathCheck;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use uuid::Uuid;

/// An operation a tool wants to perform outside the workspace boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapeOperation {
    /// Reading a file.
    Read,
    /// Writing to a file.
    Write,
    /// Creating a file or directory.
    Create,
    /// Deleting a file or directory.
    Delete,
    /// Executing a file.
    Execute,
    /// Listing a directory.
    List,
}

impl std::fmt::Display for EscapeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Execute => "execute",
            Self::List => "list",
        };
        write!(f, "{label}")
    }
}

/// A request to escape the workspace boundary, surfaced to the principal
/// for approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscapeRequest {
    /// Unique request id.
    pub request_id: Uuid,
    /// Path being accessed.
    pub path: PathBuf,
    /// Operation being performed.
    pub operation: EscapeOperation,
    /// Human-readable reason, surfaced alongside the approval prompt.
    pub reason: String,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// Tool that initiated the request, if any.
    #[serde(default)]
    pub tool_name: Option<String>,
}

impl EscapeRequest {
    /// Build a new escape request.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, operation: EscapeOperation, reason: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            path: path.into(),
            operation,
            reason: reason.into(),
            created_at: Utc::now(),
            tool_name: None,
        }
    }

    /// Attach the name of the tool that triggered this request.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = Some(tool.into());
        self
    }
}

/// A principal's decision on an [`EscapeRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapeDecision {
    /// Allow this one call only.
    AllowOnce,
    /// Allow for the remainder of the session.
    AllowSession,
    /// Allow always; remember the path across sessions.
    AllowAlways,
    /// Deny the request.
    Deny,
}

impl EscapeDecision {
    /// True for every variant except `Deny`.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Deny)
    }

    /// True only for `AllowAlways`.
    #[must_use]
    pub fn should_remember(&self) -> bool {
        matches!(self, Self::AllowAlways)
    }
}

/// Persistable state for an [`EscapeHandler`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscapeState {
    /// Paths permanently remembered via `AllowAlways`.
    pub remembered_paths: Vec<PathBuf>,
}

/// Tracks escape decisions across and within sessions.
#[derive(Debug, Clone, Default)]
pub struct EscapeHandler {
    remembered_paths: HashSet<PathBuf>,
    session_paths: HashSet<PathBuf>,
}

impl EscapeHandler {
    /// A handler with no remembered or session-scoped paths.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decision made on `request`. Paths are canonicalized before
    /// storing so later lookups are consistent regardless of how the path
    /// was originally spelled.
    pub fn process_decision(&mut self, request: &EscapeRequest, decision: EscapeDecision) {
        let canonical = std::fs::canonicalize(&request.path).unwrap_or_else(|_| request.path.clone());
        match decision {
            EscapeDecision::AllowAlways => {
                self.remembered_paths.insert(canonical);
            },
            EscapeDecision::AllowSession => {
                self.session_paths.insert(canonical);
            },
            EscapeDecision::AllowOnce | EscapeDecision::Deny => {},
        }
    }

    /// Whether `path` has already been allowed (remembered or session-scoped).
    #[must_use]
    pub fn is_allowed(&self, path: &PathBuf) -> bool {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
        self.remembered_paths.contains(&canonical) || self.session_paths.contains(&canonical)
    }

    /// Drop session-scoped grants; remembered grants survive.
    pub fn clear_session(&mut self) {
        self.session_paths.clear();
    }

    /// Drop every grant, remembered or session-scoped.
    pub fn clear_all(&mut self) {
        self.remembered_paths.clear();
        self.session_paths.clear();
    }

    /// Export the remembered (permanent) grants for persistence.
    #[must_use]
    pub fn export_state(&self) -> EscapeState {
        EscapeState { remembered_paths: self.remembered_paths.iter().cloned().collect() }
    }

    /// Merge a previously exported state in. Only absolute paths that still
    /// canonicalize (i.e. exist on disk) are restored, which rejects stale
    /// or injected relative/non-existent entries.
    pub fn restore_state(&mut self, state: EscapeState) {
        for path in state.remembered_paths {
            if path.is_absolute() {
                if let Ok(canonical) = std::fs::canonicalize(&path) {
                    self.remembered_paths.insert(canonical);
                }
            }
        }
    }
}

/// The outcome of running a path through boundary classification and, if
/// needed, the escape-approval flow.
#[derive(Debug, Clone)]
pub enum EscapeFlow {
    /// Allowed outright.
    Allowed,
    /// Refused outright.
    Denied,
    /// Needs a principal decision before proceeding.
    NeedsApproval(EscapeRequest),
}

impl EscapeFlow {
    /// Derive a flow outcome from a boundary's classification.
    #[must_use]
    pub fn from_check(check: PathCheck, path: PathBuf, operation: EscapeOperation, reason: impl Into<String>) -> Self {
        match check {
            PathCheck::Allowed | PathCheck::AutoAllowed => Self::Allowed,
            PathCheck::NeverAllowed => Self::Denied,
            PathCheck::RequiresApproval => Self::NeedsApproval(EscapeRequest::new(path, operation, reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_request_carries_the_tool_name() {
        let request = EscapeRequest::new("/etc/passwd", EscapeOperation::Read, "need config").with_tool("read_file");
        assert_eq!(request.operation, EscapeOperation::Read);
        assert_eq!(request.tool_name, Some("read_file".to_string()));
    }

    #[test]
    fn only_deny_is_not_allowed() {
        assert!(EscapeDecision::AllowOnce.is_allowed());
        assert!(EscapeDecision::AllowSession.is_allowed());
        assert!(EscapeDecision::AllowAlways.is_allowed());
        assert!(!EscapeDecision::Deny.is_allowed());
        assert!(EscapeDecision::AllowAlways.should_remember());
        assert!(!EscapeDecision::AllowOnce.should_remember());
    }

    #[test]
    fn allow_always_persists_across_clear_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let request = EscapeRequest::new(&path, EscapeOperation::Read, "test");

        let mut handler = EscapeHandler::new();
        assert!(!handler.is_allowed(&path));
        handler.process_decision(&request, EscapeDecision::AllowAlways);
        assert!(handler.is_allowed(&path));
        handler.clear_session();
        assert!(handler.is_allowed(&path));
        handler.clear_all();
        assert!(!handler.is_allowed(&path));
    }

    #[test]
    fn allow_session_does_not_survive_clear_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let request = EscapeRequest::new(&path, EscapeOperation::Read, "test");

        let mut handler = EscapeHandler::new();
        handler.process_decision(&request, EscapeDecision::AllowSession);
        assert!(handler.is_allowed(&path));
        handler.clear_session();
        assert!(!handler.is_allowed(&path));
    }

    #[test]
    fn state_export_and_restore_round_trips() {
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        let path1 = dir1.path().to_path_buf();
        let path2 = dir2.path().to_path_buf();

        let mut handler = EscapeHandler::new();
        handler.process_decision(&EscapeRequest::new(&path1, EscapeOperation::Read, "t"), EscapeDecision::AllowAlways);
        handler.process_decision(&EscapeRequest::new(&path2, EscapeOperation::Write, "t"), EscapeDecision::AllowAlways);

        let state = handler.export_state();
        assert_eq!(state.remembered_paths.len(), 2);

        let json = serde_json::to_string(&state).unwrap();
        let restored: EscapeState = serde_json::from_str(&json).unwrap();

        let mut fresh = EscapeHandler::new();
        fresh.restore_state(restored);
        assert!(fresh.is_allowed(&path1));
        assert!(fresh.is_allowed(&path2));
    }

    #[test]
    fn restore_state_rejects_relative_and_nonexistent_paths() {
        let mut handler = EscapeHandler::new();
        handler.restore_state(EscapeState {
            remembered_paths: vec![
                PathBuf::from("relative/path"),
                PathBuf::from("../escape"),
                PathBuf::from("/nonexistent/path/does/not/exist"),
            ],
        });
        assert!(handler.export_state().remembered_paths.is_empty());
    }

    #[test]
    fn escape_flow_maps_requires_approval_into_a_request() {
        let flow = EscapeFlow::from_check(
            PathCheck::RequiresApproval,
            PathBuf::from("/tmp/x"),
            EscapeOperation::Write,
            "writing output",
        );
        assert!(matches!(flow, EscapeFlow::NeedsApproval(_)));
    }
}
