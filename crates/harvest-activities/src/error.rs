use thiserror::Error;

use harvest_browser::BrowserError;

pub type Result<T> = std::result::Result<T, ActivityError>;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("rewards api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("quiz state data missing from page")]
    MissingQuizData,

    #[error("quiz did not refresh after answer: {0}")]
    RefreshFailed(String),

    #[error("http error: {0}")]
    Http(String),
}

impl ActivityError {
    /// Status code for the guard's API monitor, when one applies.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            ActivityError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ActivityError> for harvest_types::FlowError {
    fn from(err: ActivityError) -> Self {
        match err {
            ActivityError::Browser(e) => e.into(),
            other => harvest_types::FlowError::Activity(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ActivityError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => {
                ActivityError::Api { status: status.as_u16(), message: err.to_string() }
            }
            None => ActivityError::Http(err.to_string()),
        }
    }
}
