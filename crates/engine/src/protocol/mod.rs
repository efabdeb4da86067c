//! Core HTTP protocol types shared by the codec and the connection.
//!
//! - **Events** ([`event`]): what the request parser produces
//!   - [`Event`]: start line, header, headers-complete, body chunk, message-complete
//!   - [`RequestLine`]: method, target and version of a request
//!
//! - **Messages** ([`message`]): payload items and framing
//!   - [`Message`]: head or payload of an outgoing response
//!   - [`PayloadItem`]: a body chunk or the EOF sentinel
//!   - [`PayloadSize`]: how a request body is delimited
//!   - [`ResponseFraming`]: how a response body is delimited
//!
//! - **Request / Response** ([`request`], [`response`])
//!   - [`RequestHeader`], assembled from events by [`RequestHeadBuilder`]
//!   - [`ResponseHead`] plus status semantics helpers
//!
//! - **Bodies** ([`body`]): [`body::ReqBody`] and the bounded stream buffer
//!
//! - **Errors** ([`error`]): [`HttpError`], [`ParseError`], [`SendError`]

mod event;
pub use event::Event;
pub use event::RequestLine;

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;
pub use message::ResponseFraming;

mod request;
pub use request::RequestHeadBuilder;
pub use request::RequestHeader;

mod response;
pub use response::ResponseHead;
pub use response::{status_forbids_length, status_has_body};

mod error;
pub use error::BoxError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
