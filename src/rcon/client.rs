//! Implementation of the [RCON](https://wiki.vg/RCON) protocol.

use super::{
    packet::{validate_payload, RconPacket, RconPacketType, AUTH_FAILED_ID},
    transport::Connection,
};
use crate::{config::RconConfig, errors::RconError};
use std::io::{self, ErrorKind};
use tracing::{debug, warn};

/// Where a [`RconSession`] is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection. Initial state, and the state after any failure.
    Closed,
    /// Opening the TCP connection.
    Connecting,
    /// Waiting for the answer to the login packet.
    Authenticating,
    /// Authenticated, commands can be sent.
    Ready,
}

/// A long-lived RCON client that reconnects on demand.
///
/// The session connects and authenticates lazily on the first command, and
/// again on the first command after any transport failure. It never retries
/// on its own: every failure is returned to the caller, who decides when to
/// try again.
///
/// # Examples
///
/// ```no_run
/// use mvinv_sync::{config::RconConfig, rcon::RconSession};
///
/// #[tokio::main]
/// async fn main() -> Result<(), mvinv_sync::errors::RconError> {
///     let mut session = RconSession::new(RconConfig::new("localhost", 25575, "password"));
///
///     let output = session.execute("mvinv reload").await?;
///     println!("{output}");
///
///     session.disconnect().await;
///     Ok(())
/// }
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct RconSession {
    config: RconConfig,
    state: SessionState,
    next_request_id: i32,
    connection: Option<Connection>,
}

impl RconSession {
    /// Construct a session. Nothing is sent until [`RconSession::connect`] or
    /// [`RconSession::execute`] is called.
    #[must_use]
    pub fn new(config: RconConfig) -> Self {
        Self {
            config,
            state: SessionState::Closed,
            next_request_id: 1,
            connection: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Open the connection and authenticate, unless already [`SessionState::Ready`].
    ///
    /// # Errors
    /// Returns [`RconError::Connect`] if the server cannot be reached and
    /// [`RconError::Authentication`] if the password was rejected. If the
    /// connection breaks or stalls during the login exchange itself, the error
    /// is [`RconError::Transport`] or [`RconError::Timeout`], as for a command;
    /// [`RconError::Encoding`] means the password cannot be sent at all. Any
    /// error leaves the session [`SessionState::Closed`].
    pub async fn connect(&mut self) -> Result<(), RconError> {
        if self.state == SessionState::Ready && self.connection.is_some() {
            return Ok(());
        }

        validate_payload(&self.config.secret, self.config.max_frame_len)?;
        self.teardown().await;

        self.state = SessionState::Connecting;
        debug!(addr = %self.config.addr(), "connecting");

        let connection = match Connection::open(
            &self.config.host,
            self.config.port,
            self.config.timeout,
            self.config.max_response_len,
        )
        .await
        {
            Ok(connection) => connection,
            Err(err) => {
                self.state = SessionState::Closed;
                return Err(err);
            }
        };

        self.connection = Some(connection);
        self.state = SessionState::Authenticating;

        if let Err(err) = self.authenticate().await {
            warn!(addr = %self.config.addr(), error = %err, "rcon login failed");
            self.teardown().await;
            return Err(err);
        }

        self.state = SessionState::Ready;
        debug!(addr = %self.config.addr(), "authenticated");

        Ok(())
    }

    /// Run the given command on the server and return its output.
    ///
    /// Connects first if needed. Exactly one request frame is sent and exactly
    /// one response frame is read; output that does not fit in one frame is
    /// not reassembled.
    ///
    /// # Arguments
    /// * `command` - The command to run. Must not contain NUL bytes and must
    ///   fit in one frame.
    ///
    /// # Errors
    /// Returns [`RconError::Encoding`] without any I/O if the command cannot be
    /// sent, the errors of [`RconSession::connect`], and [`RconError::Transport`]
    /// or [`RconError::Timeout`] if the exchange broke. Transport failures close
    /// the session; the next call reconnects.
    pub async fn execute(&mut self, command: &str) -> Result<String, RconError> {
        validate_payload(command, self.config.max_frame_len)?;
        self.connect().await?;

        let request_id = self.next_request_id();
        debug!(request_id, command, "running command");

        let packet = RconPacket::new(request_id, RconPacketType::RunCommand, command);

        match self.exchange(&packet).await {
            Ok(response) if response.request_id == AUTH_FAILED_ID => {
                self.teardown().await;
                Err(RconError::Authentication)
            }
            Ok(response) => Ok(response.payload),
            Err(err) => {
                if err.is_connection_fatal() {
                    warn!(request_id, error = %err, "rcon connection dropped");
                    self.teardown().await;
                }
                Err(err)
            }
        }
    }

    /// Close the connection. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        if self.connection.is_some() {
            debug!(addr = %self.config.addr(), "disconnecting");
        }
        self.teardown().await;
    }

    async fn authenticate(&mut self) -> Result<(), RconError> {
        let packet = RconPacket::new(
            self.next_request_id(),
            RconPacketType::Login,
            self.config.secret.as_str(),
        );

        let response = self.exchange(&packet).await?;

        // the server echoes -1 instead of our ID when the password is wrong
        if response.request_id == AUTH_FAILED_ID {
            return Err(RconError::Authentication);
        }

        Ok(())
    }

    /// Send one packet and read the one response.
    async fn exchange(&mut self, packet: &RconPacket) -> Result<RconPacket, RconError> {
        let frame = packet.encode(self.config.max_frame_len)?;

        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| RconError::Transport(io::Error::from(ErrorKind::NotConnected)))?;

        connection.send_frame(&frame).await?;
        let body = connection.recv_frame().await?;

        Ok(RconPacket::decode(body)?)
    }

    /// Hand out the next request ID, skipping the reserved `-1` on wrap around.
    fn next_request_id(&mut self) -> i32 {
        let id = self.next_request_id;

        self.next_request_id = match id.wrapping_add(1) {
            AUTH_FAILED_ID => 0,
            next => next,
        };

        id
    }

    async fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.state = SessionState::Closed;
    }
}
