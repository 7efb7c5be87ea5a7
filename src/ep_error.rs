use std::time::Duration;

use crate::types::Stage;

/// Error enum for the tracking core.
///
/// Categories:
/// - Local: `InvalidTransition`, recovered in place, stage unchanged
/// - Fetch: `FetchFailure`, `FetchTimeout`, `MalformedResponse`, drive Backoff and retry
/// - Lifecycle: `FetchInFlight`, `NotPolling`, `ShutDown`, caller misuse or a finished actor
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EpError {
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: Stage, event: String },

    #[error("Status fetch failed: {0}")]
    FetchFailure(String),

    #[error("Status fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("Malformed status response: {0}")]
    MalformedResponse(String),

    #[error("A status fetch is already in flight")]
    FetchInFlight,

    #[error("Synchronizer is not polling")]
    NotPolling,

    #[error("Synchronizer shut down")]
    ShutDown,
}

impl EpError {
    /// Returns true for the fetch family: the poll loop backs off and tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EpError::FetchFailure(_) | EpError::FetchTimeout(_) | EpError::MalformedResponse(_)
        )
    }

    /// Short text for the transient banner shown in the detail view.
    pub fn banner_text(&self) -> String {
        match self {
            EpError::FetchTimeout(_) => "Status server is not responding, retrying…".to_string(),
            EpError::MalformedResponse(_) => {
                "Received an unreadable status update, retrying…".to_string()
            }
            EpError::FetchFailure(msg) => format!("Could not refresh status: {}", msg),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for EpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EpError::MalformedResponse(err.to_string())
        } else {
            EpError::FetchFailure(err.to_string())
        }
    }
}

/// Lets CLI code that still speaks `Result<T, String>` use `?` on core calls.
impl From<EpError> for String {
    fn from(err: EpError) -> String {
        err.to_string()
    }
}
