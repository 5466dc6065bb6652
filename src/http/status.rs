//! HTTP status codes plus the internal sentinels that never come from an origin.

pub const OK: u16 = 200;
pub const NO_CONTENT: u16 = 204;
pub const NOT_MODIFIED: u16 = 304;
pub const BAD_REQUEST: u16 = 400;
pub const FORBIDDEN: u16 = 403;
pub const NOT_FOUND: u16 = 404;
pub const INTERNAL_SERVER_ERROR: u16 = 500;
pub const BAD_GATEWAY: u16 = 502;
pub const SERVICE_UNAVAILABLE: u16 = 503;
pub const GATEWAY_TIMEOUT: u16 = 504;

/// Cache-only fetch that found nothing.
pub const NOT_IN_CACHE_STATUS: u16 = 9001;

// Status codes stored in negative cache entries.
pub const REMEMBER_NOT_CACHEABLE_200: u16 = 10001;
pub const REMEMBER_NOT_CACHEABLE: u16 = 10002;
pub const REMEMBER_FETCH_FAILED: u16 = 10003;
pub const REMEMBER_FETCH_DROPPED: u16 = 10004;
pub const REMEMBER_EMPTY: u16 = 10005;

/// Canonical reason phrase for the codes this crate produces itself.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        NOT_IN_CACHE_STATUS => "Not In Cache",
        _ => "",
    }
}

/// True for the statuses above reserved for internal use.
pub fn is_internal(code: u16) -> bool {
    code >= 1000
}
