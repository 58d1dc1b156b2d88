//! Completion callbacks.

pub mod client;
pub mod error;
pub mod log;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;

pub use client::HttpNotifier;
pub use error::NotifyError;
pub use log::LogNotifier;
pub use types::CompletionPayload;

/// Delivers completion payloads to an item's callback URL.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(
        &self,
        url: &str,
        payload: &CompletionPayload,
        timeout: Duration,
    ) -> Result<(), NotifyError>;
}
