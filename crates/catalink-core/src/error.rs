use thiserror::Error;

use crate::models::IdentityField;

/// All errors that can occur in catalink-core.
#[derive(Debug, Error)]
pub enum CatalinkError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// An insert or update would give a second record the same identity value.
    #[error("Identity already taken: {field} = {value}")]
    UniqueViolation { field: IdentityField, value: String },

    /// SQLite reported the database as busy or locked.
    #[error("Store busy: {0}")]
    StoreBusy(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl CatalinkError {
    /// Busy/locked conditions clear on their own; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreBusy(_))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

impl From<rusqlite::Error> for CatalinkError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(code, ref msg)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                CatalinkError::StoreBusy(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            other => CatalinkError::Database(other),
        }
    }
}

/// Exit codes used by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    Conflict = 7,
}

pub type Result<T> = std::result::Result<T, CatalinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_errors_are_transient() {
        let err: CatalinkError = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        )
        .into();
        assert!(err.is_transient());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn other_sqlite_errors_are_permanent() {
        let err: CatalinkError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CatalinkError::Database(_)));
        assert!(!err.is_transient());
    }
}
