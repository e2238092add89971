//! Error types for Locketdash

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LocketError>;

#[derive(Error, Debug)]
pub enum LocketError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LocketError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LocketError::InvalidInput(_) => 3,
            LocketError::Config(_) => 2,
            LocketError::Feed(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// A failed feed request.
///
/// The loader treats every variant the same way ("fetch failed"); the
/// distinction only exists for logging and display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Feed source unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FeedError::Timeout
        } else if let Some(status) = error.status() {
            FeedError::Status(status.as_u16())
        } else {
            FeedError::Network(error.to_string())
        }
    }
}
