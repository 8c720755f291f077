use thiserror::Error;

use harvest_browser::BrowserError;
use harvest_types::SecurityIncident;

pub type Result<T> = std::result::Result<T, LoginError>;

#[derive(Error, Debug)]
pub enum LoginError {
    /// Retried by re-observing the page (prompt dismissal failed, a
    /// transient element went missing).
    #[error("recoverable login problem: {0}")]
    Recoverable(String),

    /// No retry: blocked phrase, missing 2FA secret, transition bound hit.
    #[error("fatal login failure: {0}")]
    Fatal(String),

    /// Blocked with an attached incident that must reach the orchestrator.
    #[error("login raised security incident: {}", .0.kind)]
    Security(Box<SecurityIncident>),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl LoginError {
    pub fn is_target_closed(&self) -> bool {
        matches!(self, LoginError::Browser(e) if e.is_target_closed())
    }
}

impl From<LoginError> for harvest_types::FlowError {
    fn from(err: LoginError) -> Self {
        use harvest_types::FlowError;
        match err {
            LoginError::Recoverable(msg) => FlowError::LoginRecoverable(msg),
            LoginError::Fatal(msg) => FlowError::LoginFatal(msg),
            LoginError::Security(incident) => FlowError::Security(*incident),
            LoginError::Browser(e) => e.into(),
        }
    }
}
