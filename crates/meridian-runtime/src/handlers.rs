//! In-process and process-form handlers for the builtin tool set registered
//! by `meridian_registry::ToolRegistry::builtin()`, plus the registry that
//! maps a tool name to its [`ToolHandler`].

use crate::sandbox::{ProcessSpec, ToolHandler};
use async_trait::async_trait;
use meridian_workspace::{EscapeDecision, EscapeFlow, EscapeHandler, EscapeOperation, EscapeRequest, WorkspaceBoundary};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Maps tool names to the handler that executes them.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the builtin tool set's handlers wired up, scoped to
    /// `boundary` for filesystem access.
    #[must_use]
    pub fn builtin(boundary: WorkspaceBoundary) -> Self {
        let boundary = Arc::new(boundary);
        let mut registry = Self::new();
        registry.register("read_file", Arc::new(ReadFileHandler::new(boundary.clone())));
        registry.register("write_file", Arc::new(WriteFileHandler::new(boundary)));
        registry.register("shell_exec", Arc::new(ShellExecHandler));
        registry.register("web_fetch", Arc::new(WebFetchHandler));
        registry.register("send_message", Arc::new(SendMessageHandler));
        registry.register("schedule_job", Arc::new(ScheduleJobHandler));
        registry
    }

    /// Register (or replace) a handler.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Look up a handler by tool name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }
}

fn missing_arg(name: &str) -> String {
    format!("missing required argument \"{name}\"")
}

fn string_arg(arguments: &Value, name: &str) -> Result<String, String> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing_arg(name))
}

/// Reads a file, refusing paths outside the workspace boundary.
pub struct ReadFileHandler {
    boundary: Arc<WorkspaceBoundary>,
}

impl ReadFileHandler {
    /// Build a handler scoped to `boundary`.
    #[must_use]
    pub fn new(boundary: Arc<WorkspaceBoundary>) -> Self {
        Self { boundary }
    }
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn invoke(&self, arguments: Value) -> Result<Value, String> {
        let path = PathBuf::from(string_arg(&arguments, "path")?);
        if self.boundary.check(&path).is_blocked() {
            return Err(format!("path {} is outside the allowed workspace", path.display()));
        }
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Ok(Value::String(contents))
    }
}

/// Writes a file, refusing paths outside the workspace boundary and routing
/// paths that still require interactive approval through the escape-request
/// flow instead of failing flatly.
pub struct WriteFileHandler {
    boundary: Arc<WorkspaceBoundary>,
    escapes: Mutex<EscapeHandler>,
}

impl WriteFileHandler {
    /// Build a handler scoped to `boundary`, with a fresh escape-approval
    /// ledger.
    #[must_use]
    pub fn new(boundary: Arc<WorkspaceBoundary>) -> Self {
        Self {
            boundary,
            escapes: Mutex::new(EscapeHandler::new()),
        }
    }

    /// Record a principal's decision on a pending escape request, so a
    /// subsequent write to the same path is allowed (or stays denied)
    /// without asking again.
    pub fn resolve_escape(&self, request: &EscapeRequest, decision: EscapeDecision) {
        self.escapes.lock().expect("escape handler lock poisoned").process_decision(request, decision);
    }
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn invoke(&self, arguments: Value) -> Result<Value, String> {
        let path = PathBuf::from(string_arg(&arguments, "path")?);
        let content = string_arg(&arguments, "content")?;

        match EscapeFlow::from_check(self.boundary.check(&path), path.clone(), EscapeOperation::Write, "write_file tool call") {
            EscapeFlow::Denied => {
                return Err(format!("write to {} is blocked: outside the allowed workspace", path.display()));
            }
            EscapeFlow::NeedsApproval(request) => {
                let already_allowed = self.escapes.lock().expect("escape handler lock poisoned").is_allowed(&path);
                if !already_allowed {
                    return Err(format!(
                        "write to {} requires approval (escape request {})",
                        path.display(),
                        request.request_id
                    ));
                }
            }
            EscapeFlow::Allowed => {}
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }
        tokio::fs::write(&path, content).await.map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        Ok(Value::Bool(true))
    }
}

/// Runs a shell command. Marked `requires_sandbox` on its descriptor, so it
/// only ever dispatches through [`crate::sandbox::ProcessSandbox`].
pub struct ShellExecHandler;

#[async_trait]
impl ToolHandler for ShellExecHandler {
    async fn invoke(&self, _arguments: Value) -> Result<Value, String> {
        Err("shell_exec has no in-process form; it must run under ProcessSandbox".to_string())
    }

    fn command(&self, arguments: &Value) -> Option<ProcessSpec> {
        let command = arguments.get("command")?.as_str()?.to_string();
        Some(ProcessSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), command],
            env: HashMap::new(),
            network: false,
        })
    }
}

/// Fetches a URL over HTTP. Illustrative only; no redirect/robots handling.
pub struct WebFetchHandler;

#[async_trait]
impl ToolHandler for WebFetchHandler {
    async fn invoke(&self, arguments: Value) -> Result<Value, String> {
        let url = string_arg(&arguments, "url")?;
        let response = reqwest::get(&url).await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "status": status, "body": body }))
    }
}

/// Delivers a message through an outbound channel port.
///
/// This illustrative handler only validates arguments and reports success;
/// actual channel delivery is the Channel Port's responsibility (spec §4.X)
/// and is wired in by the caller that constructs the runtime.
pub struct SendMessageHandler;

#[async_trait]
impl ToolHandler for SendMessageHandler {
    async fn invoke(&self, arguments: Value) -> Result<Value, String> {
        let channel = string_arg(&arguments, "channel")?;
        let text = string_arg(&arguments, "text")?;
        Ok(serde_json::json!({ "delivered_to": channel, "length": text.len() }))
    }
}

/// Registers a new scheduler job.
///
/// Like [`SendMessageHandler`], this illustrative handler validates its
/// arguments; wiring a real job into `meridian-scheduler`'s store is the
/// caller's responsibility.
pub struct ScheduleJobHandler;

#[async_trait]
impl ToolHandler for ScheduleJobHandler {
    async fn invoke(&self, arguments: Value) -> Result<Value, String> {
        let name = string_arg(&arguments, "name")?;
        let cron = string_arg(&arguments, "cron")?;
        let _prompt = string_arg(&arguments, "prompt")?;
        Ok(serde_json::json!({ "scheduled": name, "cron": cron }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_workspace::WorkspaceConfig;
    use serde_json::json;

    fn boundary(root: &std::path::Path) -> Arc<WorkspaceBoundary> {
        Arc::new(WorkspaceBoundary::new(WorkspaceConfig::new(root.to_path_buf())))
    }

    #[tokio::test]
    async fn read_file_handler_reads_within_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let handler = ReadFileHandler::new(boundary(dir.path()));
        let result = handler
            .invoke(json!({"path": dir.path().join("a.txt").to_string_lossy()}))
            .await
            .unwrap();
        assert_eq!(result, json!("hello"));
    }

    #[tokio::test]
    async fn write_file_handler_refuses_a_never_allowed_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::new(dir.path().to_path_buf()).never_allow("/etc");
        let handler = WriteFileHandler::new(Arc::new(WorkspaceBoundary::new(config)));
        let err = handler
            .invoke(json!({"path": "/etc/shadow", "content": "x"}))
            .await
            .unwrap_err();
        assert!(err.contains("requires approval") || err.contains("blocked"));
    }

    #[tokio::test]
    async fn write_file_handler_surfaces_an_escape_request_for_an_unapproved_path() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let handler = WriteFileHandler::new(boundary(dir.path()));
        let err = handler
            .invoke(json!({"path": outside.path().join("x.txt").to_string_lossy(), "content": "hi"}))
            .await
            .unwrap_err();
        assert!(err.contains("escape request"));
    }

    #[tokio::test]
    async fn write_file_handler_allows_a_previously_approved_path() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("x.txt");
        let handler = WriteFileHandler::new(boundary(dir.path()));

        let request = meridian_workspace::EscapeRequest::new(&target, meridian_workspace::EscapeOperation::Write, "test");
        handler.resolve_escape(&request, meridian_workspace::EscapeDecision::AllowSession);

        let result = handler.invoke(json!({"path": target.to_string_lossy(), "content": "hi"})).await.unwrap();
        assert_eq!(result, json!(true));
    }

    #[test]
    fn shell_exec_handler_produces_a_process_spec() {
        let spec = ShellExecHandler.command(&json!({"command": "echo hi"})).unwrap();
        assert_eq!(spec.program, "/bin/sh");
        assert_eq!(spec.args, vec!["-c".to_string(), "echo hi".to_string()]);
    }

    #[tokio::test]
    async fn builtin_registry_has_every_builtin_tool_name() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HandlerRegistry::builtin(WorkspaceBoundary::new(WorkspaceConfig::new(dir.path().to_path_buf())));
        for name in ["read_file", "write_file", "shell_exec", "web_fetch", "send_message", "schedule_job"] {
            assert!(registry.get(name).is_some());
        }
    }
}
