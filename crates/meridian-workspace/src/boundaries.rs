//! Workspace boundary checking: is a path in-bounds for a session's tools?

use crate::config::{EscapePolicy, WorkspaceConfig, WorkspaceMode};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of checking a path against workspace boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathCheck {
    /// Path is within the workspace root.
    Allowed,
    /// Path is outside the root but configured as auto-allowed.
    AutoAllowed,
    /// Path is a protected system path; never allowed.
    NeverAllowed,
    /// Path requires principal approval before use.
    RequiresApproval,
}

impl PathCheck {
    /// True for `Allowed` and `AutoAllowed`.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed | Self::AutoAllowed)
    }

    /// True for `RequiresApproval`.
    #[must_use]
    pub fn needs_approval(&self) -> bool {
        matches!(self, Self::RequiresApproval)
    }

    /// True for `NeverAllowed`.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::NeverAllowed)
    }
}

/// Checks paths against a session's workspace boundary.
///
/// Glob patterns are pre-compiled at construction time.
#[derive(Debug)]
pub struct WorkspaceBoundary {
    config: WorkspaceConfig,
    compiled_matchers: Vec<GlobMatcher>,
}

impl Clone for WorkspaceBoundary {
    fn clone(&self) -> Self {
        Self::new(self.config.clone())
    }
}

impl WorkspaceBoundary {
    /// Build a boundary checker from `config`, compiling its glob patterns.
    /// Patterns that fail to compile are dropped with a warning rather than
    /// failing construction.
    #[must_use]
    pub fn new(config: WorkspaceConfig) -> Self {
        let compiled_matchers = config
            .auto_allow
            .patterns
            .iter()
            .filter_map(|pattern| match Glob::new(pattern) {
                Ok(glob) => Some(glob.compile_matcher()),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "failed to compile workspace auto-allow glob");
                    None
                },
            })
            .collect();

        Self { config, compiled_matchers }
    }

    /// The boundary's configuration.
    #[must_use]
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Whether `path` resolves under the workspace root.
    #[must_use]
    pub fn is_in_workspace(&self, path: &Path) -> bool {
        self.expand_path(path).starts_with(&self.config.root)
    }

    /// Whether `path` is auto-allowed (explicit read/write path or glob
    /// pattern), independent of workspace membership.
    #[must_use]
    pub fn is_auto_allowed(&self, path: &Path) -> bool {
        let expanded = self.expand_path(path);

        for allowed in &self.config.auto_allow.read {
            if expanded.starts_with(allowed) {
                return true;
            }
        }
        for allowed in &self.config.auto_allow.write {
            if expanded.starts_with(allowed) {
                return true;
            }
        }
        self.compiled_matchers.iter().any(|m| m.is_match(&expanded))
    }

    /// Whether `path` falls under a protected, never-allowed prefix.
    #[must_use]
    pub fn is_never_allowed(&self, path: &Path) -> bool {
        let expanded = self.expand_path(path);

        for blocked in &self.config.never_allow {
            let blocked_expanded = blocked.canonicalize().unwrap_or_else(|_| blocked.clone());
            if expanded.starts_with(&blocked_expanded) || expanded.starts_with(blocked) {
                return true;
            }
        }
        false
    }

    /// Classify `path` against this boundary.
    #[must_use]
    pub fn check(&self, path: &Path) -> PathCheck {
        let expanded = self.expand_path(path);

        debug!(path = %path.display(), expanded = %expanded.display(), "checking path against workspace boundary");

        if self.is_never_allowed(&expanded) {
            return PathCheck::NeverAllowed;
        }
        if self.is_in_workspace(&expanded) {
            return PathCheck::Allowed;
        }
        if self.is_auto_allowed(&expanded) {
            return PathCheck::AutoAllowed;
        }

        match self.config.mode {
            WorkspaceMode::Autonomous => PathCheck::Allowed,
            WorkspaceMode::Guided | WorkspaceMode::Safe => match self.config.escape_policy {
                EscapePolicy::Allow => PathCheck::AutoAllowed,
                EscapePolicy::Deny => PathCheck::NeverAllowed,
                EscapePolicy::Ask => PathCheck::RequiresApproval,
            },
        }
    }

    /// Canonicalize `path`, falling back to a manual join against the root
    /// for paths that don't yet exist.
    #[must_use]
    pub fn expand_path(&self, path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.config.root.join(path)
            }
        })
    }

    /// Check several paths at once (e.g. a tool call touching more than
    /// one file) and return the most restrictive verdict.
    #[must_use]
    pub fn check_all(&self, paths: &[&Path]) -> PathCheck {
        let mut result = PathCheck::Allowed;
        for path in paths {
            match self.check(path) {
                PathCheck::NeverAllowed => return PathCheck::NeverAllowed,
                PathCheck::RequiresApproval => result = PathCheck::RequiresApproval,
                PathCheck::AutoAllowed if result == PathCheck::Allowed => {
                    result = PathCheck::AutoAllowed;
                },
                _ => {},
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn path_check_helpers_classify_correctly() {
        assert!(PathCheck::Allowed.is_allowed());
        assert!(PathCheck::AutoAllowed.is_allowed());
        assert!(!PathCheck::NeverAllowed.is_allowed());
        assert!(PathCheck::RequiresApproval.needs_approval());
        assert!(PathCheck::NeverAllowed.is_blocked());
        assert!(!PathCheck::Allowed.is_blocked());
    }

    #[test]
    fn paths_inside_the_root_are_in_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let config = WorkspaceConfig::new(temp_dir.path().canonicalize().unwrap());
        let boundary = WorkspaceBoundary::new(config);

        let in_workspace = temp_dir.path().join("src/main.rs");
        assert!(boundary.is_in_workspace(&in_workspace));
        assert!(!boundary.is_in_workspace(Path::new("/definitely/outside")));
    }

    #[test]
    fn never_allow_beats_everything_else() {
        let config = WorkspaceConfig::new("/home/user/project").never_allow("/etc");
        let boundary = WorkspaceBoundary::new(config);

        assert!(boundary.is_never_allowed(Path::new("/etc/passwd")));
        assert_eq!(boundary.check(Path::new("/etc/passwd")), PathCheck::NeverAllowed);
    }

    #[test]
    fn explicit_auto_allow_paths_are_recognized() {
        let config = WorkspaceConfig::new("/home/user/project").allow_read("/usr/share/doc");
        let boundary = WorkspaceBoundary::new(config);

        assert!(boundary.is_auto_allowed(Path::new("/usr/share/doc/readme.txt")));
    }

    #[test]
    fn autonomous_mode_allows_everything_not_blocked() {
        let config = WorkspaceConfig::new("/home/user/project").with_mode(WorkspaceMode::Autonomous);
        let boundary = WorkspaceBoundary::new(config);

        assert_eq!(boundary.check(Path::new("/tmp/random/file")), PathCheck::Allowed);
    }

    #[test]
    fn guided_mode_defers_to_the_escape_policy() {
        let deny = WorkspaceConfig::new("/home/user/project").with_escape_policy(EscapePolicy::Deny);
        assert_eq!(
            WorkspaceBoundary::new(deny).check(Path::new("/tmp/outside")),
            PathCheck::NeverAllowed
        );

        let ask = WorkspaceConfig::new("/home/user/project").with_escape_policy(EscapePolicy::Ask);
        assert_eq!(
            WorkspaceBoundary::new(ask).check(Path::new("/tmp/outside")),
            PathCheck::RequiresApproval
        );
    }

    #[test]
    fn check_all_returns_the_most_restrictive_verdict() {
        let temp_dir = TempDir::new().unwrap();
        let config = WorkspaceConfig::new(temp_dir.path().canonicalize().unwrap())
            .with_escape_policy(EscapePolicy::Ask);
        let boundary = WorkspaceBoundary::new(config);

        let inside = temp_dir.path().join("a.txt");
        let outside = PathBuf::from("/tmp/outside-check-all");
        let verdict = boundary.check_all(&[&inside, &outside]);
        assert_eq!(verdict, PathCheck::RequiresApproval);
    }
}
