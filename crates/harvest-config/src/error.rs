use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("cannot parse duration '{0}' (expected e.g. \"500ms\", \"3s\", \"2m\")")]
    BadDuration(String),

    #[error("malformed json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("account not found in file: {0}")]
    AccountNotFound(String),
}
