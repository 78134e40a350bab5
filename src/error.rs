use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoftscopeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Filter error: {message}")]
    Filter { message: String },
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Record not found: no {entity} matches {filter}")]
    RecordNotFound { entity: String, filter: String },
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, SoftscopeError>;

// Helper conversions
impl From<rusqlite::Error> for SoftscopeError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for SoftscopeError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for SoftscopeError {
    fn from(e: serde_json::Error) -> Self { Self::Filter { message: e.to_string() } }
}

impl SoftscopeError {
    pub(crate) fn filter(message: impl Into<String>) -> Self {
        Self::Filter { message: message.into() }
    }
}
