//! Convenience re-exports for downstream crates.

pub use crate::context::{RequestContext, RequestGuard};
pub use crate::error::{TelemetryError, TelemetryResult};
pub use crate::logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
