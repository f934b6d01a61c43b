//! Exchange of whole frames over a TCP connection, each step with a deadline.

use crate::{
    errors::{timeout_err, RconError},
    socket::ReadWriteFrame,
};
use bytes::Bytes;
use std::{future::Future, io, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::trace;

/// An open connection to the server.
///
/// Any error returned by [`Connection::send_frame`] or [`Connection::recv_frame`]
/// leaves the stream in an unknown position; the caller drops the connection.
#[derive(Debug)]
pub(super) struct Connection<S = TcpStream> {
    socket: S,
    timeout: Duration,
    max_response_len: usize,
}

impl Connection {
    /// Connect to `host:port`, giving up after `timeout_after`.
    pub async fn open(
        host: &str,
        port: u16,
        timeout_after: Duration,
        max_response_len: usize,
    ) -> Result<Self, RconError> {
        let addr = format!("{host}:{port}");
        let connecting = TcpStream::connect(addr.clone());

        let socket = connect_within(addr, timeout_after, connecting).await?;

        Ok(Self::new(socket, timeout_after, max_response_len))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(socket: S, timeout: Duration, max_response_len: usize) -> Self {
        Self {
            socket,
            timeout,
            max_response_len,
        }
    }

    /// Write a whole encoded frame.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<(), RconError> {
        trace!(len = frame.len(), "sending frame");

        match timeout(self.timeout, self.socket.write_frame(frame)).await {
            Ok(result) => result.map_err(RconError::Transport),
            Err(_) => Err(RconError::Timeout(self.timeout)),
        }
    }

    /// Read the body of the next frame.
    pub async fn recv_frame(&mut self) -> Result<Bytes, RconError> {
        let reading = self.socket.read_frame(self.max_response_len);

        let body = match timeout(self.timeout, reading).await {
            Ok(result) => result.map_err(RconError::from_io)?,
            Err(_) => return Err(RconError::Timeout(self.timeout)),
        };

        trace!(len = body.len(), "recieved frame");
        Ok(body)
    }

    /// Shut the connection down. Errors are ignored since the socket is
    /// dropped either way.
    pub async fn close(mut self) {
        let _ = timeout(self.timeout, self.socket.shutdown()).await;
    }
}

/// Wait at most `timeout_after` for `connecting`, reporting every failure as
/// [`RconError::Connect`].
async fn connect_within<F, S>(
    addr: String,
    timeout_after: Duration,
    connecting: F,
) -> Result<S, RconError>
where
    F: Future<Output = io::Result<S>>,
{
    match timeout(timeout_after, connecting).await {
        Ok(Ok(socket)) => Ok(socket),
        Ok(Err(source)) => Err(RconError::Connect { addr, source }),
        Err(_) => Err(RconError::Connect {
            addr,
            source: timeout_err(),
        }),
    }
}
