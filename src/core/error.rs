use crate::core::asset::AssetCode;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the accounting engine.
///
/// Everything except [`EngineError::Store`] is raised before the working
/// state is committed, so a failed operation never leaves partial effects.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid operation type '{0}'")]
    InvalidOperationType(String),

    #[error("insufficient {asset}: available {available}, required {required}")]
    InsufficientFunds {
        asset: AssetCode,
        available: Decimal,
        required: Decimal,
    },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("lot {0} not found")]
    LotNotFound(Uuid),

    #[error("arithmetic failure in {0}")]
    Arithmetic(&'static str),

    #[error("snapshot hook refused the operation: {0}")]
    Hook(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised by a [`crate::store::DeskStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("desk document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
