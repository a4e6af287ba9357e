//! Workspace boundary configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How strictly the workspace boundary treats paths outside its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceMode {
    /// Every out-of-workspace access requires approval unless auto-allowed.
    Safe,
    /// Out-of-workspace access falls back to `escape_policy`.
    Guided,
    /// Everything except `never_allow` paths is permitted.
    Autonomous,
}

/// What happens to an out-of-workspace path once `WorkspaceMode` defers to
/// it (Guided/Safe modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscapePolicy {
    /// Treat the path as auto-allowed.
    Allow,
    /// Refuse the path outright.
    Deny,
    /// Surface an approval request to the principal.
    Ask,
}

/// Paths and glob patterns that bypass the workspace root check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoAllowRules {
    /// Paths allowed for reads regardless of workspace membership.
    pub read: Vec<PathBuf>,
    /// Paths allowed for writes regardless of workspace membership.
    pub write: Vec<PathBuf>,
    /// Glob patterns matched against the canonicalized path.
    pub patterns: Vec<String>,
}

/// The configuration a [`crate::boundaries::WorkspaceBoundary`] is built
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// The workspace root directory.
    pub root: PathBuf,
    /// Paths that are never allowed, even in autonomous mode.
    pub never_allow: Vec<PathBuf>,
    /// Paths/patterns auto-allowed outside the root.
    pub auto_allow: AutoAllowRules,
    /// The operating mode.
    pub mode: WorkspaceMode,
    /// Fallback policy for Guided/Safe modes.
    pub escape_policy: EscapePolicy,
}

impl WorkspaceConfig {
    /// A Guided-mode config rooted at `root`, asking for approval on escape.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            never_allow: Vec::new(),
            auto_allow: AutoAllowRules::default(),
            mode: WorkspaceMode::Guided,
            escape_policy: EscapePolicy::Ask,
        }
    }

    /// Add a path that is never allowed.
    #[must_use]
    pub fn never_allow(mut self, path: impl Into<PathBuf>) -> Self {
        self.never_allow.push(path.into());
        self
    }

    /// Auto-allow a path for reads.
    #[must_use]
    pub fn allow_read(mut self, path: impl Into<PathBuf>) -> Self {
        self.auto_allow.read.push(path.into());
        self
    }

    /// Auto-allow a path for writes.
    #[must_use]
    pub fn allow_write(mut self, path: impl Into<PathBuf>) -> Self {
        self.auto_allow.write.push(path.into());
        self
    }

    /// Set the operating mode.
    #[must_use]
    pub fn with_mode(mut self, mode: WorkspaceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the escape policy used in Guided/Safe modes.
    #[must_use]
    pub fn with_escape_policy(mut self, policy: EscapePolicy) -> Self {
        self.escape_policy = policy;
        self
    }

    /// The configured root, as a borrow.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
