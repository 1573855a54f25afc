// ============================================================================
// Error Handling
// ============================================================================

use crate::identifiers::{AgencyTag, RouteTag, ServiceTag, StopId};

/// Failure to obtain a response body from the feed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
}

/// A payload arrived but does not have the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field `{field}` is missing")]
    MissingField { field: String },

    #[error("field `{field}` has an unexpected shape, expected {expected}")]
    UnexpectedShape { field: String, expected: &'static str },

    #[error("field `{field}` has an invalid value: {value}")]
    InvalidValue { field: String, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Agency not found: {0}")]
    AgencyNotFound(AgencyTag),

    #[error("Route not found: {route} (agency {agency})")]
    RouteNotFound { agency: AgencyTag, route: RouteTag },

    #[error("Service not found: {service} (agency {agency})")]
    ServiceNotFound { agency: AgencyTag, service: ServiceTag },

    #[error("Stop not found: {stop} (agency {agency})")]
    StopNotFound { agency: AgencyTag, stop: StopId },
}

impl FeedError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FeedError::AgencyNotFound(_)
                | FeedError::RouteNotFound { .. }
                | FeedError::ServiceNotFound { .. }
                | FeedError::StopNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Decode(DecodeError::Json(e))
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
