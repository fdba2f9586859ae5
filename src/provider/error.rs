//! Cloud API error types.
//!
//! Every call made through the resource client ends in one of these
//! variants. They are kept small and single-line so they can be surfaced
//! to the host tool without further formatting.

use thiserror::Error;

/// Errors that can occur while talking to the cloud API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a usable HTTP response (network, TLS, decoding).
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a failure status code.
    ///
    /// `message` is already shortened and may carry a known-cause prefix,
    /// e.g. `404: resource is missing: Resource does not exist`.
    #[error("{status}: {message}")]
    Status { status: u16, message: String },

    /// The asynchronous operation behind a request reported `FAILED`.
    #[error("{message}")]
    RequestFailed { request_id: String, message: String },

    /// The asynchronous operation never reached a terminal state.
    #[error("timeout has expired waiting for request {request_id} after {attempts} polls")]
    Timeout { request_id: String, attempts: u32 },

    /// Polling the request status endpoint itself failed.
    #[error("error getting request status: {source}")]
    Poll {
        request_id: String,
        source: Box<ApiError>,
    },

    /// A mutating call returned no location header to follow.
    #[error("response carries no usable request location: {0:?}")]
    InvalidLocation(String),
}

impl ApiError {
    /// Create a status-code error
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Whether the remote resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    /// Whether this is a wait-ceiling timeout rather than a remote failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the remote async operation reported `FAILED`.
    pub fn is_request_failed(&self) -> bool {
        matches!(self, Self::RequestFailed { .. })
    }
}

/// Result type alias for cloud API operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;
