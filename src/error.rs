// Authentication Error Types
// Closed taxonomy for session operations: every provider failure is
// normalized into one of these kinds before a caller sees it.

use thiserror::Error;

/// Fallback message for failures that carry no message of their own.
pub(crate) const GENERIC_FAILURE: &str = "authentication request failed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable identity provider: the execution context cannot host one,
    /// or provider construction failed. Operations short-circuit with this
    /// error and make no network call.
    #[error("Auth not available")]
    ProviderUnavailable,

    /// The provider rejected the credentials or the account creation.
    /// Carries the provider's message verbatim.
    #[error("{0}")]
    AuthenticationFailure(String),

    /// Any other failure surfaced by a provider call.
    #[error("{0}")]
    Unexpected(String),
}

impl AuthError {
    /// Build an `Unexpected` error, substituting the generic message when
    /// the source carries none.
    pub fn unexpected(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            AuthError::Unexpected(GENERIC_FAILURE.to_string())
        } else {
            AuthError::Unexpected(message)
        }
    }

    /// True when the operation never reached the provider.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::ProviderUnavailable)
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::unexpected(err.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::unexpected(format!("malformed provider response: {}", err))
    }
}
