//! Event Bus (spec §4.H3) — in-process typed publish/subscribe.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod event;

pub use bus::{EventBus, Subscription};
pub use event::Event;
