use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::Notifier;
use super::error::NotifyError;
use super::types::CompletionPayload;

pub struct HttpNotifier {
    client: Client,
}

impl HttpNotifier {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(
        &self,
        url: &str,
        payload: &CompletionPayload,
        timeout: Duration,
    ) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    NotifyError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ItemStatus, QueueItem};
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> CompletionPayload {
        let mut item = QueueItem::new(json!({"orderId": 42}), "http://unused/", Utc::now()).unwrap();
        item.status = ItemStatus::Completed;
        item.stage = Some("delivered".into());
        CompletionPayload::from_item(&item, Utc::now())
    }

    #[tokio::test]
    async fn posts_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/callback"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({
                "status": "COMPLETED",
                "stage": "delivered",
                "payload": {"orderId": 42}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new();
        let url = format!("{}/callback", server.uri());
        notifier
            .deliver(&url, &payload(), Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_2xx_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new();
        let err = notifier
            .deliver(&server.uri(), &payload(), Duration::from_secs(2))
            .await
            .unwrap_err();
        match err {
            NotifyError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_receiver_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new();
        let err = notifier
            .deliver(&server.uri(), &payload(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Timeout { timeout_ms: 50 }));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let notifier = HttpNotifier::new();
        let err = notifier
            .deliver("http://127.0.0.1:9/", &payload(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Network(_)));
    }
}
