//! Bounded FIFO between the connection and a streaming handler.
//!
//! The connection is the only producer: it pushes every decoded body chunk with
//! [`StreamSender::put`] and the [`PayloadItem::Eof`] sentinel with [`StreamSender::finish`].
//! Both wait while the buffer is full, and since the connection does not read the transport
//! while it waits, a slow consumer pauses reading. Once the consumer takes an item, the pending
//! `put` completes and reading resumes.
//!
//! If the connection goes away before the sentinel was pushed, [`StreamReceiver::get`] returns an
//! error instead of waiting forever.

use std::future::poll_fn;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::{ParseError, PayloadItem};

/// Creates a stream buffer holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero. `ConnectionConfig` never hands out a zero capacity.
pub fn stream_buffer(capacity: usize) -> (StreamSender, StreamReceiver) {
    let (sender, receiver) = mpsc::channel(capacity);
    (StreamSender { inner: sender }, StreamReceiver { inner: receiver, eof: false })
}

/// The consumer side went away, the pushed item was discarded.
#[derive(Debug, Error)]
#[error("request body reader has been dropped")]
pub struct StreamClosed;

/// Producer side of the stream buffer.
#[derive(Debug)]
pub struct StreamSender {
    inner: mpsc::Sender<PayloadItem>,
}

impl StreamSender {
    /// Pushes one body chunk, waiting while the buffer is full.
    pub async fn put(&self, chunk: Bytes) -> Result<(), StreamClosed> {
        self.send(PayloadItem::Chunk(chunk)).await
    }

    /// Pushes the end-of-body sentinel.
    pub async fn finish(&self) -> Result<(), StreamClosed> {
        self.send(PayloadItem::Eof).await
    }

    pub(crate) async fn send(&self, item: PayloadItem) -> Result<(), StreamClosed> {
        self.inner.send(item).await.map_err(|_closed| StreamClosed)
    }

    /// Returns true if a `put` would have to wait for the consumer.
    pub fn is_full(&self) -> bool {
        self.inner.capacity() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Consumer side of the stream buffer.
#[derive(Debug)]
pub struct StreamReceiver {
    inner: mpsc::Receiver<PayloadItem>,
    eof: bool,
}

impl StreamReceiver {
    /// Takes the next item in arrival order, `PayloadItem::Eof` once the body is complete.
    pub async fn get(&mut self) -> Result<PayloadItem, ParseError> {
        poll_fn(|cx| self.poll_get(cx)).await
    }

    pub fn poll_get(&mut self, cx: &mut Context<'_>) -> Poll<Result<PayloadItem, ParseError>> {
        if self.eof {
            return Poll::Ready(Ok(PayloadItem::Eof));
        }

        match ready!(self.inner.poll_recv(cx)) {
            Some(item) => {
                self.eof = item.is_eof();
                Poll::Ready(Ok(item))
            }
            None => Poll::Ready(Err(ParseError::invalid_body("request body stream aborted before completion"))),
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }
}
