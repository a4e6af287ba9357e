//! Layered configuration for the Meridian gateway (spec §6).
//!
//! Layers are merged in order, each overriding the previous:
//! built-in defaults < system config file < environment variables <
//! workspace config file < runtime override.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod defaults;
mod env;
mod loader;
mod types;

pub use defaults::default_config;
pub use loader::{ConfigError, load_layered};
pub use types::Config;
