use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::utils::error::NotifyError;

pub mod discord;
pub mod pushover;

pub use discord::DiscordChannel;
pub use pushover::PushoverChannel;

/// A transport able to deliver one human-readable message.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn deliver(&self, message: &str) -> Result<(), NotifyError>;
}

/// Channel that only writes to the log. Useful for dry runs and tests where
/// no push credentials are configured.
pub struct LogChannel;

#[async_trait]
impl NotifyChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Push notifications with deduplication and rate limiting.
///
/// One instance is constructed per run and shared by `Arc` between the
/// scraper, the purchase driver and the bot; the last-sent map and the
/// seen-message set live here rather than in process globals. Delivery
/// failures are logged and never propagated: losing an alert must not kill
/// the buy loop.
pub struct Notifier {
    channel: Box<dyn NotifyChannel>,
    last_sent: Mutex<HashMap<String, Instant>>,
    seen: Mutex<HashSet<String>>,
}

impl Notifier {
    pub fn new(channel: Box<dyn NotifyChannel>) -> Self {
        Self {
            channel,
            last_sent: Mutex::new(HashMap::new()),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Deliver unconditionally.
    pub async fn push(&self, message: &str) {
        tracing::info!("{}", message);
        if let Err(e) = self.channel.deliver(message).await {
            tracing::warn!(channel = self.channel.name(), "notification failed: {}", e);
        }
    }

    /// Deliver at most once per process lifetime.
    pub async fn push_once(&self, message: &str) {
        let mut seen = self.seen.lock().await;
        if seen.insert(message.to_string()) {
            drop(seen);
            self.push(message).await;
        }
    }

    /// Deliver, but drop repeats of the same message arriving within
    /// `elapsed` of the previous delivery.
    pub async fn humble_push(&self, message: &str, elapsed: Duration) {
        let now = Instant::now();
        let mut last_sent = self.last_sent.lock().await;
        let recently_sent = last_sent
            .get(message)
            .is_some_and(|last| now.duration_since(*last) < elapsed);
        if !recently_sent {
            last_sent.insert(message.to_string(), now);
            drop(last_sent);
            self.push(message).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    pub(crate) struct RecordingChannel {
        pub delivered: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotifyChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, message: &str) -> Result<(), NotifyError> {
            self.delivered.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn recording_notifier() -> (Notifier, Arc<std::sync::Mutex<Vec<String>>>) {
        let delivered = Arc::new(std::sync::Mutex::new(Vec::new()));
        let notifier = Notifier::new(Box::new(RecordingChannel {
            delivered: Arc::clone(&delivered),
        }));
        (notifier, delivered)
    }

    #[tokio::test]
    async fn test_push_delivers_every_time() {
        let (notifier, delivered) = recording_notifier();
        notifier.push("3080 in stock").await;
        notifier.push("3080 in stock").await;
        assert_eq!(delivered.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_push_once_deduplicates_forever() {
        let (notifier, delivered) = recording_notifier();
        notifier.push_once("new URL for 3080").await;
        notifier.push_once("new URL for 3080").await;
        notifier.push_once("new URL for 3070").await;
        let delivered = delivered.lock().unwrap();
        assert_eq!(
            *delivered,
            vec!["new URL for 3080".to_string(), "new URL for 3070".to_string()]
        );
    }

    #[tokio::test]
    async fn test_humble_push_rate_limits() {
        let (notifier, delivered) = recording_notifier();
        notifier
            .humble_push("errors are stacking", Duration::from_secs(60))
            .await;
        notifier
            .humble_push("errors are stacking", Duration::from_secs(60))
            .await;
        assert_eq!(delivered.lock().unwrap().len(), 1);

        // A zero window always resends
        notifier
            .humble_push("errors are stacking", Duration::ZERO)
            .await;
        assert_eq!(delivered.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_log_channel_never_fails() {
        let notifier = Notifier::new(Box::new(LogChannel));
        notifier.push("anything").await;
    }
}
