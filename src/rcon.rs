//! Enables remote command execution for minecraft servers.
//! See the documentation for [`RconSession`] for more information.

mod client;
pub mod packet;
mod transport;

pub use client::{RconSession, SessionState};

use std::time::Duration;

/// Conventional limit for the body of a single request frame, in bytes.
pub const MAX_FRAME_LEN: usize = 4096;

/// Largest payload a server puts in one response frame.
pub const MAX_LEN_CLIENTBOUND: usize = 4096;

/// Default limit for the body of a recieved frame: a full clientbound payload
/// plus the header and terminator.
pub const MAX_RESPONSE_LEN: usize = MAX_LEN_CLIENTBOUND + packet::MIN_BODY_LEN;

/// Default bound for connecting, sending and recieving.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
