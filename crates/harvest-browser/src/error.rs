use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Error, Debug)]
pub enum BrowserError {
    /// The page or context went away under us. Recovered once per flow by
    /// rebuilding the context; a second occurrence is fatal for the flow.
    #[error("browser target closed: {0}")]
    TargetClosed(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    #[error("driver error: {0}")]
    Driver(String),
}

impl BrowserError {
    pub fn is_target_closed(&self) -> bool {
        matches!(self, BrowserError::TargetClosed(_))
    }
}

impl From<BrowserError> for harvest_types::FlowError {
    fn from(err: BrowserError) -> Self {
        harvest_types::FlowError::TransientBrowser(err.to_string())
    }
}
