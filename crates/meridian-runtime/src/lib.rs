//! Meridian Runtime — the Session Manager (spec §4.M4), the Agent Runtime
//! tool-use loop (spec §4.H1), and the Sandbox Driver (spec §4.M5) that sits
//! between them and any tool handler.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod agent_loop;
pub mod compaction;
pub mod error;
pub mod handlers;
pub mod sandbox;
pub mod session_manager;

pub use agent_loop::{AgentResult, AgentRuntime};
pub use error::{RuntimeError, RuntimeResult};
pub use handlers::{HandlerRegistry, ReadFileHandler, ScheduleJobHandler, SendMessageHandler, ShellExecHandler, WebFetchHandler, WriteFileHandler};
pub use sandbox::{DispatchingSandbox, NullSandbox, ProcessSandbox, ProcessSpec, ResourceLimits, SandboxDriver, ToolHandler};
pub use session_manager::{estimate_tokens, SessionManager};
