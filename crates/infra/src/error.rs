//! Store error model.

use core::fmt::Display;

use govportal_core::DomainError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a store operation.
///
/// - **NotFound**: the targeted row does not exist
/// - **Invalid**: the merged record breaks a domain rule. Nothing was persisted.
/// - **ConstraintViolation**: a referenced row is missing, or a unique/check
///   constraint rejected the write. Nothing was persisted.
/// - **Backend**: anything else (connectivity, pool closed, decode failure)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    /// Referenced ids that have no row.
    pub fn missing_related<Id: Display>(entity: &str, ids: &[Id]) -> Self {
        let list = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        Self::ConstraintViolation(format!("unknown {entity} id(s): {list}"))
    }
}
