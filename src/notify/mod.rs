// Operator notifications
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification rate limit reached, message dropped")]
    RateLimited,

    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("no async runtime available to deliver the notification")]
    NoRuntime,
}

/// Sink for operator-facing messages
///
/// Delivery is best effort. Callers log a failure and carry on.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Drops every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, text: &str) -> Result<(), NotifyError> {
        tracing::debug!("notification (disabled): {}", text);
        Ok(())
    }
}

/// Keeps messages in memory, for inspection
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, text: &str) -> Result<(), NotifyError> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text.to_string());
        }
        Ok(())
    }
}

/// Send and log a failure instead of returning it
pub fn notify_or_log(notifier: &dyn Notifier, text: &str) {
    if let Err(e) = notifier.notify(text) {
        tracing::warn!("Notification not sent: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Notifier for Failing {
        fn notify(&self, _text: &str) -> Result<(), NotifyError> {
            Err(NotifyError::RateLimited)
        }
    }

    #[test]
    fn test_memory_notifier_records() {
        let notifier = MemoryNotifier::new();
        notify_or_log(&notifier, "🚀 started");
        notify_or_log(&notifier, "🛑 stopped");

        assert_eq!(notifier.messages().len(), 2);
        assert!(notifier.contains("stopped"));
    }

    #[test]
    fn test_failures_are_swallowed() {
        notify_or_log(&Failing, "dropped");
        assert!(NullNotifier.notify("x").is_ok());
    }
}
