//! Error types for stream negotiation and media fetches

use serde_json::Value;

/// Errors from the negotiator.
///
/// `Clone` because a failed per-key negotiation is handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(#[from] mlbtv_auth::Error),

    /// The media gateway answered with a GraphQL `errors` array (blackout,
    /// missing entitlement, unknown media id). Kept verbatim.
    #[error("playback session refused: {0}")]
    Negotiation(Value),

    /// The media gateway answered with a non-200 status or a body without
    /// the expected fields.
    #[error("media gateway error: {0}")]
    Gateway(String),

    #[error("upstream returned {status} {reason}")]
    UpstreamFetch { status: u16, reason: String },

    #[error("{stage} request timed out: {message}")]
    Timeout { stage: &'static str, message: String },

    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Path or key that does not name a stream resource.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Which part of the pipeline failed, for error responses and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth",
            Error::Negotiation(_) | Error::Gateway(_) => "negotiation",
            Error::UpstreamFetch { .. } | Error::Transport(_) => "fetch",
            Error::Timeout { stage, .. } => *stage,
            Error::InvalidRequest(_) => "request",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::Auth(mlbtv_auth::Error::Timeout(_))
                | Error::UpstreamFetch { status: 504, .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
