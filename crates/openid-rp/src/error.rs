//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A required `openid.*` parameter is absent or does not parse.
    #[error("malformed assertion: {0}")]
    MalformedAssertion(String),

    /// The callback URL does not match `openid.return_to`.
    #[error("return URL mismatch: {0}")]
    ReturnUrlMismatch(String),

    /// A pipeline check rejected the assertion.
    #[error("verification failed on {check}: {reason}")]
    VerificationFailed {
        /// Name of the check that rejected the assertion.
        check: &'static str,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// The OP or an allocator did not behave as the protocol requires.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A caller-supplied URL does not parse.
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },

    /// A transport other than reqwest failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// An error occurred while performing HTTP requests.
    #[cfg(feature = "transport-reqwest")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the assertion was well formed but legitimately negative
    /// (negative mode, replayed nonce, OP refused the signature).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::VerificationFailed { .. })
    }

    /// True for malformed or tampered input and for transport failures.
    pub fn is_fatal(&self) -> bool {
        !self.is_rejection()
    }

    /// Name of the failed check, for rejections.
    pub fn check(&self) -> Option<&'static str> {
        match self {
            Error::VerificationFailed { check, .. } => Some(check),
            _ => None,
        }
    }

    pub(crate) fn missing(key: &str) -> Self {
        Error::MalformedAssertion(format!("missing parameter {key}"))
    }

    pub(crate) fn invalid_url(url: &str, source: url::ParseError) -> Self {
        Error::InvalidUrl {
            url: url.to_string(),
            source,
        }
    }
}
