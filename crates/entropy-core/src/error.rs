//! Error types for entropy-core
//!
//! Per the propagation policy: tools never raise and agents never raise —
//! they return `Option`/`Absent` sentinels instead. Only the
//! `Orchestrator`'s fatal path (pool shutdown, poisoned locks, config
//! errors at startup) surfaces an [`EntropyError`].

use thiserror::Error;

/// Result type alias using [`EntropyError`]
pub type Result<T> = std::result::Result<T, EntropyError>;

/// Exit codes for the CLI process wrapper
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const MISCONFIGURATION: i32 = 1;
}

/// Fatal error type for entropy-core
#[derive(Debug, Error)]
pub enum EntropyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("specialist pool is shutting down")]
    PoolShutdown,

    #[error("a shared lock was poisoned: {0}")]
    LockPoisoned(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EntropyError {
    /// Exit code for this error, used by the CLI process wrapper.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_codes::MISCONFIGURATION,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}
