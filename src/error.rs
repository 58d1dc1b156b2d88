use thiserror::Error;

use crate::notifier::NotifyError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Failures raised by an [`ItemStore`](crate::store::ItemStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the operation; retry later.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("duplicate item id: {0}")]
    Duplicate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_into_engine_error() {
        let err: EngineError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(
            err.to_string(),
            "Store error: store unavailable: connection refused"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
        assert_send_sync::<StoreError>();
    }
}
