use thiserror::Error;

/// Errors raised by the order flow.
///
/// Most of these never reach the end user: the engine logs persistence and
/// delivery failures and keeps the conversation going. `Rejected` carries a
/// message that is meant to be shown as-is.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Delivery error: {0}")]
    DeliveryError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("{0}")]
    Rejected(String),
}

impl From<sqlx::Error> for FlowError {
    fn from(err: sqlx::Error) -> Self {
        FlowError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::StorageError(format!("payload encoding: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
