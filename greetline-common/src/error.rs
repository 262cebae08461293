//! Common error types for greetline

use thiserror::Error;

/// Common result type for greetline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by the storage and configuration layers
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem access failed (config file, database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML or does not match the expected shape
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration missing or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record would violate a store invariant (e.g. duplicate url or phone)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
