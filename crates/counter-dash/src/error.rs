use counter_proto::roi::{RoiError, ROI_EXAMPLE};
use thiserror::Error;

/// Transport-level failure of a single HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status(401))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status(status.as_u16()),
            None if e.is_decode() => Self::Decode(e.to_string()),
            None => Self::Transport(e.to_string()),
        }
    }
}

/// What the view shows next to the data a failure affects.  Nothing here is
/// fatal; every variant ends up in a state slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No token, or the backend rejected it.  Not retried automatically.
    #[error("Session expired or missing. Please login.")]
    Unauthenticated,
    /// Network or non-success response.  The next cycle retries.
    #[error("{0}")]
    FetchFailed(String),
    #[error("{0}")]
    StreamUnavailable(String),
    /// Operator input did not parse.  The previous value is kept.
    #[error("{0}")]
    MalformedInput(String),
}

impl SyncError {
    /// Map a transport failure, keeping 401 distinct from everything else.
    pub fn from_fetch(context: &str, e: FetchError) -> Self {
        if e.is_unauthorized() {
            Self::Unauthenticated
        } else {
            Self::FetchFailed(format!("{}: {}", context, e))
        }
    }
}

impl From<RoiError> for SyncError {
    fn from(e: RoiError) -> Self {
        Self::MalformedInput(format!("{}. Example: {}", e, ROI_EXAMPLE))
    }
}
