//! Error types for the identity handshake

use crate::flow::Step;

/// Errors from token acquisition.
///
/// `Clone` so a single failed attempt can be reported to every caller that
/// was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A step got a non-200 answer or a response without the field it needs.
    /// Usually means wrong credentials or that the login form changed shape.
    #[error("identity {step} step failed: {message}")]
    Protocol { step: Step, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("identity request timed out: {0}")]
    Timeout(String),

    /// Steps were driven with state that the chain could not have produced.
    #[error("authentication is occurring out of order: {0}")]
    FlowOrder(String),
}

impl Error {
    pub(crate) fn protocol(step: Step, message: impl Into<String>) -> Self {
        Self::Protocol {
            step,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
