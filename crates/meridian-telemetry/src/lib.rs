//! Meridian Telemetry — structured logging and request-correlation context
//! shared by every binary and long-running component in the workspace.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
