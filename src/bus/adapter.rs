//! The [`BusAdapter`] trait and its in-process default implementation
//! (spec.md 4.10, SPEC_FULL.md 4.10 "ambient"). A production NATS-backed
//! adapter is out of scope (spec.md 1) and would implement the same trait.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use super::{subjects, BusError};

/// One message observed by a subscriber: the concrete subject it was
/// published on (not the subscription pattern) and its JSON body.
#[derive(Clone, Debug)]
pub struct BusMessage {
    pub subject: String,
    pub payload: serde_json::Value,
}

/// Subject-based pub/sub for cross-process settlement status propagation.
/// Publish is fire-and-forget; subscribe is at-least-once (spec.md 4.10).
#[async_trait]
pub trait BusAdapter: Send + Sync {
    async fn publish(&self, subject: &str, payload: &(impl Serialize + Sync)) -> Result<(), BusError>;

    /// Subscribes to every subject matching `pattern` (a literal subject or
    /// one ending in `*`, per `subjects::matches`).
    async fn subscribe(&self, pattern: &str) -> broadcast::Receiver<BusMessage>;
}

/// An in-process bus backed by a single broadcast channel, with subscribers
/// filtering on their own pattern. Used as the default adapter and in tests
/// (SPEC_FULL.md 4.10).
pub struct InProcessBus {
    sender: Mutex<broadcast::Sender<BusMessage>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusAdapter for InProcessBus {
    async fn publish(&self, subject: &str, payload: &(impl Serialize + Sync)) -> Result<(), BusError> {
        let payload = serde_json::to_value(payload).map_err(|_| BusError::Closed)?;
        let message = BusMessage {
            subject: subject.to_string(),
            payload,
        };
        // Fire-and-forget: no subscribers is not an error (spec.md 4.10).
        let _ = self.sender.lock().unwrap().send(message);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> broadcast::Receiver<BusMessage> {
        let mut raw = self.sender.lock().unwrap().subscribe();
        let pattern = pattern.to_string();
        let (tx, rx) = broadcast::channel(1024);
        tokio::spawn(async move {
            loop {
                match raw.recv().await {
                    Ok(message) if subjects::matches(&pattern, &message.subject) => {
                        let _ = tx.send(message);
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_is_observed_by_a_subscriber() {
        let bus = InProcessBus::new();
        let mut rx = bus.subscribe(&subjects::settlement_status("p-1")).await;
        bus.publish(&subjects::settlement_status("p-1"), &json!({"state": "Initiated"}))
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.subject, subjects::settlement_status("p-1"));
        assert!(subjects::matches("settlement.status.*", &msg.subject));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = InProcessBus::new();
        bus.publish(&subjects::settlement_secret("p-9"), &json!({"secret": "ff"}))
            .await
            .unwrap();
    }
}
