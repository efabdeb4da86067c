use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, ResponseFraming, ResponseHead, SendError};

/// Encodes a response as a head followed by its payload items.
///
/// After a head whose framing carries a body, payload items are routed to the matching
/// [`PayloadEncoder`] until the body is finished. A second head before that, or a payload
/// item without a head, is rejected.
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns true while a body is still expected for the last encoded head.
    pub fn in_body(&self) -> bool {
        self.payload_encoder.is_some()
    }

    /// Forgets any half-written response.
    pub fn reset(&mut self) {
        self.payload_encoder = None;
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, ResponseFraming), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, ResponseFraming), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, framing)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_body("response head written while a body is in progress"));
                }

                self.payload_encoder = PayloadEncoder::for_framing(framing);
                self.header_encoder.encode((head, framing), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
                    return Err(SendError::invalid_body("payload written without a response head"));
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}
