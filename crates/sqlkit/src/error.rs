//! Error types for sqlkit

use thiserror::Error;

/// Result type alias for sqlkit operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Input rejected before any SQL text is built.
///
/// Kept separate from [`SqlError`] so that builders can carry a deferred
/// failure while staying `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Unsafe or malformed column/table/expression name
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// Operator outside the allow-list
    #[error("Invalid operator '{0}'")]
    InvalidOperator(String),

    /// Argument outside its valid range (negative limit, empty insert, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ValidationError {
    pub(crate) fn identifier(value: &str, reason: impl Into<String>) -> Self {
        // Never echo unbounded caller input back into logs.
        let mut shown: String = value.chars().take(64).collect();
        if shown.len() < value.len() {
            shown.push_str("...");
        }
        Self::InvalidIdentifier {
            value: shown,
            reason: reason.into(),
        }
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum SqlError {
    /// Caller input rejected by the identifier/operator allow-lists
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Driver name not recognised, or no built-in handle for it
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// commit/rollback with no open transaction
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// A migration unit failed; `source` is the untouched underlying error
    #[error("Migration '{migration}' failed: {source}")]
    Migration {
        migration: String,
        #[source]
        source: Box<SqlError>,
    },

    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL driver error
    #[cfg(feature = "postgres")]
    #[error("Postgres error: {}", postgres_message(.0))]
    Postgres(#[from] tokio_postgres::Error),

    /// Error reported by a host-supplied driver
    #[error("Driver error: {0}")]
    Driver(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error (migration directories)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server-side errors carry severity, SQLSTATE and detail; `Display` on
/// `tokio_postgres::Error` alone only says "db error".
#[cfg(feature = "postgres")]
fn postgres_message(e: &tokio_postgres::Error) -> String {
    use std::error::Error as _;

    match e.as_db_error() {
        Some(db) => {
            let mut msg = format!("{} {}: {}", db.severity(), db.code().code(), db.message());
            if let Some(detail) = db.detail() {
                msg.push_str(&format!(" ({detail})"));
            }
            msg
        }
        None => match e.source() {
            Some(source) => format!("{e}: {source}"),
            None => e.to_string(),
        },
    }
}

impl SqlError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a transaction state error
    pub fn transaction_state(message: impl Into<String>) -> Self {
        Self::TransactionState(message.into())
    }

    /// Wrap an error raised while running a migration unit.
    pub fn migration(migration: impl Into<String>, source: SqlError) -> Self {
        Self::Migration {
            migration: migration.into(),
            source: Box::new(source),
        }
    }

    /// Check if this is an invalid identifier error
    pub fn is_invalid_identifier(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::InvalidIdentifier { .. })
        )
    }

    /// Check if this is an invalid operator error
    pub fn is_invalid_operator(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::InvalidOperator(_)))
    }

    /// Check if this is a transaction state error
    pub fn is_transaction_state(&self) -> bool {
        matches!(self, Self::TransactionState(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// SQLSTATE reported by the Postgres server, looking through migration wrappers
    #[cfg(feature = "postgres")]
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Postgres(e) => e.as_db_error().map(|db| db.code().code()),
            Self::Migration { source, .. } => source.sqlstate(),
            _ => None,
        }
    }
}
