use bytes::{Buf, Bytes};

/// One part of an outgoing response: the head, or a piece of its body.
///
/// For responses `T` is a `(ResponseHead, ResponseFraming)` pair.
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

/// A piece of a body stream.
///
/// Produced by the payload decoders, carried through the request body
/// stream buffer, and consumed by the payload encoders. `Eof` is the sentinel
/// that terminates a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// The chunk data, `None` for `Eof`.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// How the body of an incoming request is delimited.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` bytes
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// no body at all
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

/// How an outgoing response body is framed on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseFraming {
    /// `Content-Length` delimited body
    Length(u64),
    /// `Transfer-Encoding: chunked` body
    Chunked,
    /// Body delimited by closing the connection, used for HTTP/1.0 peers when the size is unknown
    UntilClose,
    /// Only the head is written. Used for `HEAD` requests, carrying the length the body would have had,
    /// and for statuses that never carry content.
    HeadOnly(Option<u64>),
}

impl ResponseFraming {
    /// Returns true if payload items follow the head
    #[inline]
    pub fn has_body(&self) -> bool {
        !matches!(self, ResponseFraming::HeadOnly(_))
    }

    /// Returns true if every chunk should be flushed as soon as it is produced
    #[inline]
    pub fn is_streamed(&self) -> bool {
        matches!(self, ResponseFraming::Chunked | ResponseFraming::UntilClose)
    }
}
