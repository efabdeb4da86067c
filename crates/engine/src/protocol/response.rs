//! HTTP response header handling implementation.
//!
//! Response heads are `http::Response<()>` values. The helpers here decide which
//! statuses are allowed to carry content.

use http::{Response, StatusCode};

/// Type alias for HTTP response headers.
///
/// This type represents the header portion of an HTTP response, using
/// `http::Response<()>` with an empty body placeholder.
pub type ResponseHead = Response<()>;

/// Returns false for `1xx`, `204 No Content` and `304 Not Modified`, which never carry a body.
pub fn status_has_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

/// Returns true for statuses that must not send `Content-Length` or `Transfer-Encoding` at all.
pub fn status_forbids_length(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT
}
