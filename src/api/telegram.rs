use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::notify::{NotifyError, Notifier};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const MESSAGES_PER_MINUTE: u32 = 20;
const REQUEST_TIMEOUT_SECS: u64 = 10;

// Type alias for the rate limiter to simplify signatures
type TelegramRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API notifier
///
/// `notify` never blocks the engine loop: the request is spawned on the
/// runtime and its outcome only logged. Messages over the rate limit are
/// dropped.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
    rate_limiter: Arc<TelegramRateLimiter>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API_BASE, token, chat_id)
    }

    /// Point at another API host, e.g. a local mock
    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(MESSAGES_PER_MINUTE).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Post one message and wait for the reply
    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if self.rate_limiter.check().is_err() {
            return Err(NotifyError::RateLimited);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;

        let notifier = self.clone();
        let text = text.to_string();
        handle.spawn(async move {
            if let Err(e) = notifier.send(&text).await {
                tracing::warn!("Telegram delivery failed: {}", e);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_posts_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "chat_id": "42",
                "text": "✅ EURUSD closed"
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base_url(server.url(), "TOKEN", "42").unwrap();
        notifier.send("✅ EURUSD closed").await.unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn test_api_error_is_reported() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(401)
            .with_body("Unauthorized")
            .create();

        let notifier = TelegramNotifier::with_base_url(server.url(), "TOKEN", "42").unwrap();
        let err = tokio_test::block_on(notifier.send("hi")).unwrap_err();

        assert!(matches!(err, NotifyError::Rejected { status: 401, .. }));
    }

    #[test]
    fn test_notify_without_runtime_fails_cleanly() {
        let notifier = TelegramNotifier::with_base_url("http://127.0.0.1:9", "TOKEN", "42").unwrap();
        assert!(matches!(notifier.notify("hi"), Err(NotifyError::NoRuntime)));
    }

    #[test]
    fn test_rate_limit_drops_excess() {
        let notifier = TelegramNotifier::with_base_url("http://127.0.0.1:9", "TOKEN", "42").unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();

        let results: Vec<_> = (0..MESSAGES_PER_MINUTE + 1).map(|i| notifier.notify(&format!("m{}", i))).collect();
        assert!(results[..MESSAGES_PER_MINUTE as usize].iter().all(|r| r.is_ok()));
        assert!(matches!(results.last(), Some(Err(NotifyError::RateLimited))));
    }
}
