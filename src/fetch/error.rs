use crate::http::UrlError;

/// Why a fetch did not produce a usable response.
///
/// Sinks never see this type: the streaming protocol reports failure through
/// `done(false)` plus a status code. Internal async helpers return it and the
/// owning decorator maps it onto the sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("certificate rejected: {0}")]
    CertificateRejected(String),
    #[error("fetch timed out after {0} ms")]
    Timeout(i64),
    #[error("origin returned status {0}")]
    OriginError(u16),
    #[error("cache entry corrupted: {0}")]
    CacheCorruption(String),
    #[error("fetch cancelled: {0}")]
    Cancelled(String),
    #[error("fetch shed under load")]
    LoadShed,
    #[error("lock {0} is held by another fetch")]
    LockDenied(String),
    #[error("recent fetch failure remembered")]
    RememberedFailure,
}

impl FetchError {
    /// Cancellations are reported to statistics separately from failures.
    pub fn is_cancel(&self) -> bool {
        matches!(self, FetchError::Cancelled(_))
    }
}

impl From<UrlError> for FetchError {
    fn from(e: UrlError) -> Self {
        FetchError::InputInvalid(e.to_string())
    }
}
