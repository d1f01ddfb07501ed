//! Error types for pgread.

use thiserror::Error;

/// The main error type for pgread operations.
///
/// Database failures keep the driver error as their source so the caller sees
/// the server's message verbatim, prefixed with the phase that failed.
#[derive(Debug, Error)]
pub enum PgReadError {
    /// Could not open a transaction on the target database.
    #[error("could not start transaction on database '{database}': {source}")]
    Transaction {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// The statement failed to prepare or execute.
    #[error("could not execute query: {source}")]
    Execution {
        #[source]
        source: sqlx::Error,
    },

    /// A positional argument could not be converted to its parameter type.
    #[error("could not bind argument ${position}: {message}")]
    Argument { position: usize, message: String },

    /// A value could not be read out of the current row.
    #[error("could not scan output for query (column '{column}'): {message}")]
    Scan { column: String, message: String },

    /// Catalog output did not carry an expected column.
    #[error("missing column '{0}' in query output")]
    MissingColumn(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Output could not be converted into attributes.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PgReadError {
    /// Create a transaction-open error for the given database.
    pub fn transaction(database: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Transaction {
            database: database.into(),
            source,
        }
    }

    /// Create an execution error.
    pub fn execution(source: sqlx::Error) -> Self {
        Self::Execution { source }
    }

    /// Create an argument error for the 1-based `position`.
    pub fn argument(position: usize, message: impl ToString) -> Self {
        Self::Argument {
            position,
            message: message.to_string(),
        }
    }

    /// Create a scan error for the given column.
    pub fn scan(column: impl Into<String>, message: impl ToString) -> Self {
        Self::Scan {
            column: column.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for pgread operations.
pub type PgReadResult<T> = Result<T, PgReadError>;
