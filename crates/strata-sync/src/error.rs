//! Error types for layer synchronization.

use strata_core::TreeError;

/// Errors returned by the sync coordinator and layer services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    /// The mutation was rejected locally; nothing was sent.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The layer service answered with a non-success status.
    #[error("layer service rejected the request: HTTP {status}{}", detail(.message))]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Response body, when one was readable.
        message: Option<String>,
    },

    /// The layer service could not be reached or timed out.
    #[error("layer service unreachable: {0}")]
    RemoteUnreachable(String),

    /// The layer service answered with a body that could not be decoded.
    #[error("invalid layer service response: {0}")]
    InvalidResponse(String),

    /// The HTTP service was configured with an invalid URL or header.
    #[error("invalid layer service configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Create a rejection error.
    pub fn rejected(status: u16, message: Option<String>) -> Self {
        Self::RemoteRejected { status, message }
    }

    /// Whether the error came from the remote side.
    ///
    /// Remote errors roll the optimistic change back and are reported through
    /// the coordinator's `failed` signal. Local errors are silent no-ops.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::RemoteRejected { .. } | Self::RemoteUnreachable(_) | Self::InvalidResponse(_)
        )
    }

    /// The local tree error, if this is one.
    pub fn as_tree_error(&self) -> Option<&TreeError> {
        match self {
            Self::Tree(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::rejected(status.as_u16(), None)
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            // Timeouts, refused connections and broken bodies alike.
            Self::RemoteUnreachable(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for SyncError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for SyncError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::Config(err.to_string())
    }
}

fn detail(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

/// A specialized Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
