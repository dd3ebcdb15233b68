//! Error types for the knowledge base search service.

use thiserror::Error;

use crate::models::ProviderKind;
use crate::utils::retry::Retryable;

/// Errors related to configuration loading and updates.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("JSON serialize error: {0}")]
    JsonSerializeError(#[from] serde_json::Error),

    #[error("YAML serialize error: {0}")]
    YamlSerializeError(#[from] serde_yaml::Error),
}

/// Errors raised by embedding and rerank providers.
///
/// Every variant carries the provider so callers can tell which upstream failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API key is not configured")]
    MissingCredential { provider: ProviderKind },

    #[error("{provider} API error: {message}")]
    Upstream {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Connection {
        provider: ProviderKind,
        message: String,
    },

    #[error("invalid {provider} response: {message}")]
    InvalidResponse {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} request timed out")]
    Timeout { provider: ProviderKind },
}

impl ProviderError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderError::MissingCredential { provider }
            | ProviderError::Upstream { provider, .. }
            | ProviderError::Connection { provider, .. }
            | ProviderError::InvalidResponse { provider, .. }
            | ProviderError::Timeout { provider } => *provider,
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Connection { .. } | ProviderError::Timeout { .. } => true,
            // Rate limits and gateway errors are transient
            ProviderError::Upstream { message, .. } => {
                message.contains("429")
                    || message.contains("502")
                    || message.contains("503")
                    || message.contains("504")
            }
            ProviderError::MissingCredential { .. } | ProviderError::InvalidResponse { .. } => {
                false
            }
        }
    }
}

/// Vector index transport failure, tagged with the operation that was attempted.
#[derive(Debug, Error)]
#[error("index {operation} failed: {message}")]
pub struct IndexError {
    pub operation: &'static str,
    pub message: String,
}

impl IndexError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// A log entry that does not satisfy the entry schema.
#[derive(Debug, Error)]
#[error("invalid log entry: {0}")]
pub struct ValidationError(pub String);

/// Errors writing or reading the event log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialize error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Errors related to search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Index(#[from] IndexError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("{0}")]
    Index(#[from] IndexError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Other(String),
}
