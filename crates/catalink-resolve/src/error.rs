use catalink_core::CatalinkError;
use catalink_core::models::IdentityField;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A merge was requested but no stored product carries the identity.
    #[error("no existing product with {field} = {value}")]
    NotFound { field: IdentityField, value: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid GTIN: {0}")]
    InvalidGtin(String),

    /// Persisting a merge collided with another product's identity.
    #[error("store conflict: {field} = {value} already belongs to another product")]
    StoreConflict { field: IdentityField, value: String },

    #[error(transparent)]
    Store(#[from] CatalinkError),
}

impl ResolveError {
    /// Store busy/locked; the caller may try again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_busy_store_errors_are_transient() {
        assert!(ResolveError::Store(CatalinkError::StoreBusy("locked".to_string())).is_transient());
        assert!(!ResolveError::Validation("no identity".to_string()).is_transient());
        assert!(
            !ResolveError::Store(CatalinkError::ProductNotFound("x".to_string())).is_transient()
        );
    }

    #[test]
    fn messages_name_the_identity() {
        let err = ResolveError::StoreConflict {
            field: IdentityField::Barcode,
            value: "123".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "store conflict: barcode = 123 already belongs to another product"
        );
    }
}
