pub mod queries;
pub mod runner;
pub mod trends;

pub use queries::QueryPool;
pub use runner::{ProgressProbe, SearchOutcome, SearchRunner};
pub use trends::TrendsClient;

use harvest_browser::BrowserError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("progress probe failed: {0}")]
    Probe(String),
}

impl From<SearchError> for harvest_types::FlowError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Browser(e) => e.into(),
            SearchError::Probe(msg) => harvest_types::FlowError::Http(msg),
        }
    }
}
