//! Workspace bootstrap content (spec §4.H1, §4.M4): static system text
//! injected at the start of a session, with a restricted subset for
//! subagents.

use crate::error::{WorkspaceError, WorkspaceResult};
use meridian_core::SessionType;
use std::path::{Path, PathBuf};

const BOOTSTRAP_EXTENSION: &str = "md";
const SUBAGENT_DIR: &str = "subagent";

/// A workspace's bootstrap files, split into the full set every top-level
/// session sees and the restricted subset spawned subagents see.
#[derive(Debug, Clone)]
pub struct BootstrapSet {
    main_files: Vec<PathBuf>,
    subagent_files: Vec<PathBuf>,
}

impl BootstrapSet {
    /// Load a bootstrap set from `root`. Files directly under `root` form
    /// the main-session content; files under `root/subagent` form the
    /// restricted subset subagents see instead. Only `.md` files are
    /// considered; other entries are ignored.
    pub fn load(root: impl AsRef<Path>) -> WorkspaceResult<Self> {
        let root = root.as_ref();
        let main_files = collect_markdown_files(root)?;
        let subagent_files = collect_markdown_files(&root.join(SUBAGENT_DIR))?;
        Ok(Self { main_files, subagent_files })
    }

    /// Build a set directly from explicit file lists, bypassing disk
    /// discovery. Useful for tests and for callers that already know their
    /// bootstrap layout.
    #[must_use]
    pub fn from_files(main_files: Vec<PathBuf>, subagent_files: Vec<PathBuf>) -> Self {
        Self { main_files, subagent_files }
    }

    /// Assemble the system content for `session_type`: the main set for
    /// every type except `Subagent`, which gets only the restricted subset.
    /// Files are read in sorted-path order and joined with a blank line,
    /// so the result is deterministic for a fixed directory layout.
    pub fn assemble(&self, session_type: SessionType) -> WorkspaceResult<String> {
        let files = match session_type {
            SessionType::Subagent => &self.subagent_files,
            _ => &self.main_files,
        };

        let mut sections = Vec::with_capacity(files.len());
        for path in files {
            let content = std::fs::read_to_string(path).map_err(|e| WorkspaceError::BootstrapFileUnreadable {
                path: path.display().to_string(),
                detail: e.to_string(),
            })?;
            sections.push(content.trim_end().to_string());
        }
        Ok(sections.join("\n\n"))
    }

    /// The main-session file paths, in load order.
    #[must_use]
    pub fn main_files(&self) -> &[PathBuf] {
        &self.main_files
    }

    /// The subagent-subset file paths, in load order.
    #[must_use]
    pub fn subagent_files(&self) -> &[PathBuf] {
        &self.subagent_files
    }
}

fn collect_markdown_files(dir: &Path) -> WorkspaceResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| WorkspaceError::BootstrapFileUnreadable {
        path: dir.display().to_string(),
        detail: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == BOOTSTRAP_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn main_session_gets_every_top_level_file_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "second").unwrap();
        fs::write(dir.path().join("a.md"), "first").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = BootstrapSet::load(dir.path()).unwrap();
        let content = set.assemble(SessionType::Main).unwrap();
        assert_eq!(content, "first\n\nsecond");
    }

    #[test]
    fn subagents_get_only_the_restricted_subset() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("full.md"), "full context").unwrap();
        fs::create_dir(dir.path().join("subagent")).unwrap();
        fs::write(dir.path().join("subagent").join("brief.md"), "restricted brief").unwrap();

        let set = BootstrapSet::load(dir.path()).unwrap();
        assert_eq!(set.assemble(SessionType::Subagent).unwrap(), "restricted brief");
        assert_eq!(set.assemble(SessionType::Dm).unwrap(), "full context");
    }

    #[test]
    fn missing_subagent_directory_yields_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.md"), "hello").unwrap();

        let set = BootstrapSet::load(dir.path()).unwrap();
        assert_eq!(set.assemble(SessionType::Subagent).unwrap(), "");
    }

    #[test]
    fn unreadable_file_surfaces_a_workspace_error() {
        let set = BootstrapSet::from_files(vec![PathBuf::from("/nonexistent/bootstrap/missing.md")], Vec::new());
        let err = set.assemble(SessionType::Main).unwrap_err();
        assert!(matches!(err, WorkspaceError::BootstrapFileUnreadable { .. }));
    }
}
