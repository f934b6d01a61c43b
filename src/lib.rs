//! A resilient [RCON](https://wiki.vg/RCON) client, and the sidecar that uses
//! it to keep Multiverse-Inventories groups in sync with Multiverse-Core
//! survival worlds.
//!
//! The [`rcon::RconSession`] owns one connection, authenticates lazily and
//! reconnects on the next command after any failure. Retry policy is left to
//! the caller; [`sync::SyncLoop`] is one such caller.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod errors;
pub mod rcon;
mod socket;
pub mod sync;

pub use config::{Config, RconConfig};
pub use rcon::RconSession;
pub use sync::SyncLoop;
