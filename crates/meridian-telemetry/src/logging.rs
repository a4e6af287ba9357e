//! Structured logging setup.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::EnvFilter;

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colorized, multi-line.
    Pretty,
    /// Single-line, human-readable.
    Compact,
    /// Newline-delimited JSON, for log aggregators.
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard out.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Logging configuration, built up fluently before calling [`setup_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    default_directive: String,
    extra_directives: Vec<String>,
    format: LogFormat,
    target: LogTarget,
}

impl LogConfig {
    /// Start from a base level (`"info"`, `"debug"`, ...).
    #[must_use]
    pub fn new(default_directive: impl Into<String>) -> Self {
        Self {
            default_directive: default_directive.into(),
            extra_directives: Vec::new(),
            format: LogFormat::Compact,
            target: LogTarget::Stderr,
        }
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add an extra per-module filter directive, e.g. `"meridian_gateway=trace"`.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.default_directive)
            .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;
        for directive in &self.extra_directives {
            let parsed = directive
                .parse()
                .map_err(|_| TelemetryError::InvalidFilter(directive.clone()))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global `tracing` subscriber from `config`.
///
/// Respects `RUST_LOG` if set (it overrides `config`'s base directive via
/// `EnvFilter`'s normal precedence). Can only succeed once per process.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = match (config.format, config.target) {
        (LogFormat::Json, LogTarget::Stdout) => builder.json().with_writer(std::io::stdout).try_init(),
        (LogFormat::Json, LogTarget::Stderr) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, LogTarget::Stdout) => builder.pretty().with_writer(std::io::stdout).try_init(),
        (LogFormat::Pretty, LogTarget::Stderr) => builder.pretty().with_writer(std::io::stderr).try_init(),
        (LogFormat::Compact, LogTarget::Stdout) => builder.compact().with_writer(std::io::stdout).try_init(),
        (LogFormat::Compact, LogTarget::Stderr) => builder.compact().with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Install logging with sensible defaults (`info`, compact, stderr).
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::new("info"))
}
