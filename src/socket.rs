use crate::{errors::DecodingError, rcon::packet::MIN_BODY_LEN};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Result};

/// Trait to allow for reading and writing length-prefixed RCON frames from the socket.
///
/// A frame is a little-endian [i32] holding the length of the body, followed by the body.
#[async_trait]
pub(crate) trait ReadWriteFrame {
    /// Read one frame from the socket.
    /// Returns the body without the length prefix in a [Result].
    ///
    /// Partial reads are retried until the whole frame arrived. A peer closing
    /// the stream early results in [`std::io::ErrorKind::UnexpectedEof`], a length
    /// outside of `MIN_BODY_LEN..=max_len` in a [`DecodingError`] wrapped as
    /// [`std::io::ErrorKind::InvalidData`].
    async fn read_frame(&mut self, max_len: usize) -> Result<Bytes>;

    /// Write a complete, already encoded frame to the socket.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
}

#[async_trait]
impl<T> ReadWriteFrame for T
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self, max_len: usize) -> Result<Bytes> {
        let len = self.read_i32_le().await?;

        let body_len = usize::try_from(len)
            .ok()
            .filter(|body_len| (MIN_BODY_LEN..=max_len).contains(body_len))
            .ok_or(DecodingError::InvalidLength { len, max: max_len })?;

        let mut buffer = vec![0; body_len];
        self.read_exact(&mut buffer).await?;

        Ok(Bytes::from(buffer))
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.write_all(frame).await?;
        self.flush().await
    }
}
