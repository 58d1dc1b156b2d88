use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::Notifier;
use super::error::NotifyError;
use super::types::CompletionPayload;

/// Writes completion payloads to the log instead of sending them. Used by
/// the CLI when no callback receiver is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(
        &self,
        url: &str,
        payload: &CompletionPayload,
        _timeout: Duration,
    ) -> Result<(), NotifyError> {
        let stages: Vec<&str> = payload.history.iter().map(|r| r.stage.as_str()).collect();
        info!(
            item_id = %payload.id,
            url,
            finished_at = %payload.finished_at,
            stages = ?stages,
            "completion (not sent)"
        );
        Ok(())
    }
}
