//! Error types for cairn-core.
//!
//! Expected coordination outcomes (claim conflicts, double releases, missing
//! collaborator files) are ordinary return values, never errors. Everything
//! here is either an environment failure or a caller mistake.

use thiserror::Error;

/// Core error type for coordination operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Stored data that could not be parsed back
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO errors from collaborator files
    #[error("IO error: {0}")]
    IoError(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Heartbeat or release attempted by an agent that does not hold the lease
    #[error("Agent '{agent}' does not hold the lease on '{resource}'")]
    NotLeaseHolder {
        /// The contended resource.
        resource: String,
        /// The agent that attempted the operation.
        agent: String,
    },

    /// Help request already has a resolution record
    #[error("Help request #{request_id} is already resolved")]
    AlreadyResolved {
        /// Id of the original help request.
        request_id: i64,
    },
}

impl Error {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::IoError(_) => "IO_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::NotLeaseHolder { .. } => "NOT_LEASE_HOLDER",
            Self::AlreadyResolved { .. } => "ALREADY_RESOLVED",
        }
    }

    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit code scheme:
    /// - 1: User error (validation, invalid input, bad configuration)
    /// - 2: System error (IO)
    /// - 3: Not found
    /// - 4: Invalid state (database failures, holder mismatches)
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ParseError(_) | Self::InvalidConfig(_) => 1,
            Self::IoError(_) => 2,
            Self::NotFound(_) => 3,
            Self::DatabaseError(_) | Self::NotLeaseHolder { .. } | Self::AlreadyResolved { .. } => {
                4
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidConfig(format!("Failed to parse config: {err}"))
    }
}

/// Result type alias for cairn-core operations.
pub type Result<T> = std::result::Result<T, Error>;
