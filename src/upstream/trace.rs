//! Tracing spans for outbound origin fetches.

use tracing::{field, Level, Span};

pub const ATTR_HTTP_STATUS_CODE_KEY: &str = "http.status_code";
pub const ATTR_HTTP_RESPONSE_SIZE_KEY: &str = "http.response_size";

/// Span covering one origin fetch from submission to `done`.
pub fn start_fetch_span(url: &str, method: &str) -> Span {
    tracing::span!(
        Level::INFO,
        "upstream",
        http.url = url,
        http.method = method,
        http.status_code = field::Empty,
        http.response_size = field::Empty,
        error = field::Empty,
    )
}

/// Records status and wire bytes once the fetch has finished.
pub fn record_response_in_span(span: &Span, status_code: u16, wire_bytes: u64) {
    span.record(ATTR_HTTP_STATUS_CODE_KEY, status_code);
    span.record(ATTR_HTTP_RESPONSE_SIZE_KEY, wire_bytes);
}

pub fn record_error_in_span(span: &Span, err: &dyn std::error::Error) {
    span.record("error", true);
    tracing::debug!(parent: span, error = %err, "upstream error");
}
