//! All the errors defined by this crate.

use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    string::FromUtf8Error,
    time::Duration,
};
use thiserror::Error;

/// A packet could not be serialized.
///
/// Encoding happens before any bytes are written, so this error never leaves
/// a connection in a half-written state.
#[derive(Error, Debug)]
pub enum EncodingError {
    /// The payload contains a NUL byte, which the protocol uses as terminator.
    #[error("payload contains a nul byte")]
    NulInPayload,

    /// The packet body would exceed the maximum frame size.
    ///
    /// The body is the request ID, the packet type, the payload and the two
    /// terminating NUL bytes.
    #[error("packet body of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLong {
        /// Length of the body that would have been sent.
        len: usize,
        /// Configured frame limit.
        max: usize,
    },
}

/// A frame recieved from the server could not be deserialized.
#[derive(Error, Debug)]
pub enum DecodingError {
    /// The frame body is too short to hold the header and the terminator.
    #[error("frame body of {0} bytes is shorter than the 10 byte minimum")]
    TooShort(usize),

    /// The length prefix announced a frame outside of the accepted range.
    #[error("invalid frame length {len} (limit {max})")]
    InvalidLength {
        /// Length announced by the server.
        len: i32,
        /// Configured frame limit.
        max: usize,
    },

    /// The payload is not valid UTF-8.
    #[error("non-utf8 payload")]
    InvalidUtf8(#[from] FromUtf8Error),
}

impl DecodingError {
    /// Whether the error happened while framing the stream.
    ///
    /// After a framing error the position of the next frame is unknown, so the
    /// connection cannot be used any more. A payload error leaves the stream
    /// aligned on the next frame.
    #[must_use]
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::TooShort(_) | Self::InvalidLength { .. })
    }
}

impl From<EncodingError> for io::Error {
    fn from(err: EncodingError) -> Self {
        io::Error::new(ErrorKind::InvalidInput, err)
    }
}

impl From<DecodingError> for io::Error {
    fn from(err: DecodingError) -> Self {
        io::Error::new(ErrorKind::InvalidData, err)
    }
}

/// An error from an RCON session.
///
/// The variants tell apart failures worth retrying later from failures that
/// need an operator, see [`RconError::is_retryable`].
#[derive(Error, Debug)]
pub enum RconError {
    /// The TCP connection could not be established (refused, DNS failure or
    /// timeout).
    #[error("could not connect to {addr}")]
    Connect {
        /// `host:port` the session tried to reach.
        addr: String,
        /// Underlying network error.
        #[source]
        source: io::Error,
    },

    /// Authentication failed. You probably configured the wrong RCON password.
    #[error("authentication failed")]
    Authentication,

    /// The connection broke in the middle of an exchange.
    #[error("rcon connection lost")]
    Transport(#[source] io::Error),

    /// The server did not answer in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The request could not be encoded.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The response could not be decoded.
    #[error(transparent)]
    Decoding(#[from] DecodingError),
}

impl RconError {
    /// Whether trying again later may succeed without operator intervention.
    ///
    /// A wrong password or a command that can never be encoded will fail the
    /// same way every time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Authentication | Self::Encoding(_))
    }

    /// Whether the connection that produced this error must be torn down.
    pub(crate) fn is_connection_fatal(&self) -> bool {
        match self {
            Self::Encoding(_) => false,
            Self::Decoding(err) => err.is_framing(),
            _ => true,
        }
    }

    /// Sort an I/O error from the frame layer into a transport or decoding
    /// failure.
    pub(crate) fn from_io(err: io::Error) -> Self {
        if err.kind() != ErrorKind::InvalidData {
            return Self::Transport(err);
        }

        let kind = err.kind();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<DecodingError>() {
                Ok(decoding) => Self::Decoding(*decoding),
                Err(other) => Self::Transport(io::Error::new(kind, other)),
            },
            None => Self::Transport(kind.into()),
        }
    }
}

/// An error from one tick of the sync loop.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A watched file could not be read or written.
    #[error("could not access {}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The reload command could not be delivered.
    #[error("reload failed: {0}")]
    Rcon(#[from] RconError),
}

pub(crate) fn timeout_err() -> io::Error {
    io::Error::new(ErrorKind::TimedOut, "connection timed out")
}
