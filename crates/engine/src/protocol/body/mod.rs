//! HTTP request body handling.
//!
//! A request body reaches the dispatcher in one of two shapes:
//!
//! - fully buffered: the connection collected every body chunk before dispatching
//! - streaming: the dispatcher was invoked right after the head, and chunks arrive through a
//!   bounded [`stream_buffer`] while the connection keeps reading the transport
//!
//! Both are exposed through [`ReqBody`], which implements `http_body::Body`.

mod stream_buffer;

pub use stream_buffer::{StreamClosed, StreamReceiver, StreamSender, stream_buffer};

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

use crate::protocol::{ParseError, PayloadItem};

#[derive(Debug)]
pub struct ReqBody {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    Full(Option<Bytes>),
    Stream(StreamReceiver),
}

impl ReqBody {
    pub fn full(bytes: Bytes) -> Self {
        Self { kind: Kind::Full(Some(bytes)) }
    }

    pub fn empty() -> Self {
        Self::full(Bytes::new())
    }

    pub fn stream(receiver: StreamReceiver) -> Self {
        Self { kind: Kind::Stream(receiver) }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.kind, Kind::Stream(_))
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Full(bytes) => Poll::Ready(bytes.take().filter(|bytes| !bytes.is_empty()).map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(receiver) => receiver.poll_get(cx).map(|item| match item {
                Ok(PayloadItem::Chunk(bytes)) => Some(Ok(Frame::data(bytes))),
                Ok(PayloadItem::Eof) => None,
                Err(e) => Some(Err(e)),
            }),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Full(bytes) => bytes.as_ref().is_none_or(Bytes::is_empty),
            Kind::Stream(receiver) => receiver.is_eof(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Full(bytes) => SizeHint::with_exact(bytes.as_ref().map_or(0, |bytes| bytes.len() as u64)),
            Kind::Stream(_) => SizeHint::new(),
        }
    }
}
