//! The Sandbox Driver (spec §4.M5): runs a tool handler either directly
//! (trusted) or inside an isolated child process, with a wall-clock timeout
//! and fail-closed behavior when isolation is required but unavailable.

use crate::error::{RuntimeError, RuntimeResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// A tool's invocation logic: either an in-process callable or a command
/// line to run as a child process. `requires_sandbox` on the tool's
/// descriptor decides which [`SandboxDriver`] dispatches it; only the
/// `Command` form can run under [`ProcessSandbox`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool in-process with `arguments`, returning its JSON result.
    async fn invoke(&self, arguments: Value) -> Result<Value, String>;

    /// An equivalent external-process form of this handler, if it has one.
    /// Tools with `requires_sandbox: true` must return `Some` or dispatch
    /// through [`ProcessSandbox`] fails closed.
    fn command(&self, _arguments: &Value) -> Option<ProcessSpec> {
        None
    }
}

/// An external command a sandboxed handler can be re-expressed as.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Whether the tool declared the `network` side effect; informs the
    /// driver whether outbound network access should be left enabled.
    pub network: bool,
}

/// Isolation policy applied to one tool invocation.
#[async_trait]
pub trait SandboxDriver: Send + Sync {
    /// Invoke `handler` with `arguments`, honoring `timeout`.
    async fn run(
        &self,
        handler: &(dyn ToolHandler),
        arguments: Value,
        requires_sandbox: bool,
        timeout: Duration,
    ) -> RuntimeResult<Value>;
}

/// Direct in-process execution, for trusted/test environments. Still
/// enforces the wall-clock timeout.
#[derive(Debug, Default)]
pub struct NullSandbox;

#[async_trait]
impl SandboxDriver for NullSandbox {
    async fn run(
        &self,
        handler: &(dyn ToolHandler),
        arguments: Value,
        _requires_sandbox: bool,
        timeout: Duration,
    ) -> RuntimeResult<Value> {
        match tokio::time::timeout(timeout, handler.invoke(arguments)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(detail)) => Err(RuntimeError::ToolFailed {
                tool: "handler".to_string(),
                detail,
            }),
            Err(_) => Err(RuntimeError::ToolTimeout(timeout.as_millis() as u64)),
        }
    }
}

/// Resource ceilings applied to a [`ProcessSandbox`]'s children.
///
/// CPU and memory ceilings are recorded for observability and are not
/// enforced at the OS level here (no cgroups/rlimit dependency is in the
/// stack); wall-clock timeout and kill-on-timeout are enforced directly.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// Memory ceiling, in megabytes.
    pub memory_mb: u64,
    /// CPU ceiling, as a percentage of one core.
    pub cpu_pct: u32,
}

/// Spawns the handler's [`ProcessSpec`] as a child process with a read-only
/// working directory convention, no inherited network unless the tool
/// declares it, and a wall-clock timeout that kills the child on expiry.
pub struct ProcessSandbox {
    limits: ResourceLimits,
    workspace_root: std::path::PathBuf,
}

impl ProcessSandbox {
    /// Build a driver rooted at `workspace_root`, enforcing `limits`.
    #[must_use]
    pub fn new(workspace_root: impl Into<std::path::PathBuf>, limits: ResourceLimits) -> Self {
        Self {
            limits,
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl SandboxDriver for ProcessSandbox {
    async fn run(
        &self,
        handler: &(dyn ToolHandler),
        arguments: Value,
        requires_sandbox: bool,
        timeout: Duration,
    ) -> RuntimeResult<Value> {
        let Some(spec) = handler.command(&arguments) else {
            if requires_sandbox {
                warn!("tool requires sandboxing but the handler has no process form");
                return Err(RuntimeError::SandboxUnavailable);
            }
            return NullSandbox.run(handler, arguments, requires_sandbox, timeout).await;
        };

        debug!(
            program = %spec.program,
            memory_mb = self.limits.memory_mb,
            cpu_pct = self.limits.cpu_pct,
            network = spec.network,
            "dispatching tool call to ProcessSandbox"
        );

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&self.workspace_root)
            .envs(&spec.env)
            .env("MERIDIAN_SANDBOX_MEMORY_MB", self.limits.memory_mb.to_string())
            .env("MERIDIAN_SANDBOX_CPU_PCT", self.limits.cpu_pct.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !spec.network {
            command.env("MERIDIAN_SANDBOX_NO_NETWORK", "1");
        }

        let mut child = command.spawn().map_err(|e| RuntimeError::ToolFailed {
            tool: spec.program.clone(),
            detail: e.to_string(),
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RuntimeError::ToolFailed {
                    tool: spec.program.clone(),
                    detail: e.to_string(),
                })
            },
            Err(_) => {
                return Err(RuntimeError::ToolTimeout(timeout.as_millis() as u64));
            },
        };

        if !output.status.success() {
            return Err(RuntimeError::ToolFailed {
                tool: spec.program.clone(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).or_else(|_| Ok(Value::String(stdout.into_owned())))
    }
}

/// Picks [`NullSandbox`] or [`ProcessSandbox`] per tool, based on the
/// deployment's `sandbox_enabled` configuration and each call's
/// `requires_sandbox` flag.
pub struct DispatchingSandbox {
    direct: NullSandbox,
    isolated: Option<Arc<ProcessSandbox>>,
}

impl DispatchingSandbox {
    /// Build a dispatcher. `isolated` is `None` when sandboxing is disabled
    /// deployment-wide, in which case `requires_sandbox` calls fail closed.
    #[must_use]
    pub fn new(isolated: Option<Arc<ProcessSandbox>>) -> Self {
        Self {
            direct: NullSandbox,
            isolated,
        }
    }
}

#[async_trait]
impl SandboxDriver for DispatchingSandbox {
    async fn run(
        &self,
        handler: &(dyn ToolHandler),
        arguments: Value,
        requires_sandbox: bool,
        timeout: Duration,
    ) -> RuntimeResult<Value> {
        if !requires_sandbox {
            return self.direct.run(handler, arguments, requires_sandbox, timeout).await;
        }
        match &self.isolated {
            Some(driver) => driver.run(handler, arguments, requires_sandbox, timeout).await,
            None => Err(RuntimeError::SandboxUnavailable),
        }
    }
}
