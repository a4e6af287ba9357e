//! Workspace boundaries and bootstrap content (spec §4.M4, §4.M5, §4.H1):
//! where a session's tools are allowed to touch the filesystem, how escapes
//! outside that boundary are decided, and what static system content a
//! session (or its subagents) is bootstrapped with.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod boundaries;
pub mod config;
pub mod error;
pub mod escape;

pub use bootstrap::BootstrapSet;
pub use boundaries::{PathCheck, WorkspaceBoundary};
pub use config::{AutoAllowRules, EscapePolicy, WorkspaceConfig, WorkspaceMode};
pub use error::{WorkspaceError, WorkspaceResult};
pub use escape::{EscapeDecision, EscapeFlow, EscapeHandler, EscapeOperation, EscapeRequest, EscapeState};
