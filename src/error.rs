//! Failure taxonomy shared by both retrieval paths.
//!
//! Adapters classify failures at the boundary (HTTP status, process exit)
//! into one of these kinds; the fallback coordinator only ever inspects the
//! kind to decide skip-vs-fallback, and the HTTP layer maps each kind to a
//! stable status/code/message triple.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum Error {
    /// The repository does not exist or is not accessible.  This condition is
    /// source-independent, so it must never trigger the clone fallback.
    #[error("repository not found: {repo}")]
    NotFound { repo: String },

    /// The request is outside the caller-supplied parameter bounds.
    #[error("invalid request: {detail}")]
    BadRequest { detail: String },

    /// Upstream quota exhausted, or the cold-fetch page budget exceeded.
    #[error("request budget exhausted: {detail}")]
    ResourceExhausted { detail: String },

    /// A call or a background task exceeded its time bound.
    #[error("timed out: {detail}")]
    Timeout { detail: String },

    /// Unexpected response shape, unparsable pagination hint, or a malformed
    /// log record.  Always fatal to the current attempt.
    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    /// Network or process failure not otherwise classified.
    #[error("upstream failure: {0}")]
    Upstream(#[source] anyhow::Error),
}

impl Error {
    pub fn upstream(detail: impl Into<String>) -> Self {
        Error::Upstream(anyhow::anyhow!(detail.into()))
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Error::Protocol {
            detail: detail.into(),
        }
    }

    /// Stable application error code, unique per kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Upstream(_) => "1",
            Error::NotFound { .. } => "2",
            Error::BadRequest { .. } => "3",
            Error::Timeout { .. } => "4",
            Error::ResourceExhausted { .. } => "5",
            Error::Protocol { .. } => "6",
        }
    }

    /// Stable user-facing message, independent of the free-text detail.
    pub fn message(&self) -> &'static str {
        match self {
            Error::Upstream(_) => "An unknown error has occurred.",
            Error::NotFound { .. } => {
                "Repository not found or you don't have the necessary permissions"
            }
            Error::BadRequest { .. } => "Request not valid",
            Error::Timeout { .. } => "Request timeout",
            Error::ResourceExhausted { .. } => "Upstream request budget exhausted",
            Error::Protocol { .. } => "Unexpected upstream response",
        }
    }

    /// HTTP status code for the stable triple.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Upstream(_) => 500,
            Error::NotFound { .. } => 404,
            Error::BadRequest { .. } => 400,
            Error::Timeout { .. } => 408,
            Error::ResourceExhausted { .. } => 429,
            Error::Protocol { .. } => 502,
        }
    }

    /// A not-found failure is equally true for any other source; retrying via
    /// the clone path would waste work.
    pub fn skips_fallback(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether the external wrapping policy may re-attempt the call.  Parse
    /// and budget failures are final per attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Upstream(_) | Error::Timeout { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
