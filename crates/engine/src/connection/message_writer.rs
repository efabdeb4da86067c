use bytes::{Buf, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;

use crate::codec::ResponseEncoder;
use crate::protocol::{Message, ResponseFraming, ResponseHead, SendError};

/// Buffers encoded response bytes in front of the write half of the transport.
///
/// Nothing reaches the transport before [`MessageWriter::flush`]. The writer remembers how many
/// response bytes it flushed since the last [`MessageWriter::clear_buf`], which tells the
/// connection whether an error response can still replace the current one.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
    buffer: BytesMut,
    encoder: ResponseEncoder,
    flushed: usize,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), encoder: ResponseEncoder::new(), flushed: 0 }
    }

    #[inline]
    pub fn write<D>(&mut self, item: Message<(ResponseHead, ResponseFraming), D>) -> Result<(), SendError>
    where
        D: Buf,
    {
        self.encoder.encode(item, &mut self.buffer)
    }

    #[inline]
    pub async fn flush(&mut self) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.writer.write_all(&self.buffer).await?;
        self.writer.flush().await?;
        self.flushed += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }

    /// Writes an interim `1xx` response straight to the transport.
    ///
    /// Interim bytes do not count as a started response.
    pub async fn write_interim(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Encoded bytes not yet flushed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once bytes of the current response reached the transport.
    pub fn response_started(&self) -> bool {
        self.flushed > 0
    }

    /// Drops any unflushed bytes and starts over with a fresh response.
    pub fn clear_buf(&mut self) {
        self.buffer.clear();
        self.encoder.reset();
        self.flushed = 0;
    }

    pub async fn shutdown(&mut self) -> Result<(), SendError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
