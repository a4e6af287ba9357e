//! Meridian Gateway — the multi-channel RPC surface (spec §4.T): a
//! `WebSocket` wire protocol of `hello`/`hello_ok`/`request`/`response`/
//! `event` frames, dispatched against the shared session, tenant, policy,
//! job, and tool-registry stores.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod error;
pub mod methods;
pub mod protocol;
pub mod server;
pub mod state;

pub use error::{GatewayError, GatewayResult};
pub use protocol::{ClientFrame, Features, ServerFrame, WireError};
pub use server::{router, serve};
pub use state::AppState;
