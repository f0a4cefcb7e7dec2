//! Per-message processing.
//!
//! The receive loop hands every delivery to a [`MessageProcessor`]. The
//! processor decides the fate of the message: returning `Ok` acknowledges
//! it, returning an error abandons it so the broker's redelivery policy
//! applies. Deliveries are at-least-once, so processors must tolerate
//! duplicates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A single message delivery, as handed over by the broker.
///
/// The payload is an opaque copy; the broker keeps ownership of the delivery
/// until it is acknowledged. `partition` and `offset` form the delivery
/// token that the acknowledgement is scoped to.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub payload: Vec<u8>,
}

impl DeliveredMessage {
    /// Renders the payload for logging. Binary payloads degrade lossily
    /// instead of failing.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Invoked exactly once per delivery attempt, with the exact payload.
    /// Errors leave the message unacknowledged; they never stop the loop.
    async fn process(&self, message: &DeliveredMessage) -> anyhow::Result<()>;
}

pub type ImplMessageProcessor = Box<dyn MessageProcessor>;

/// Reference processor: records the arrival of each message.
pub struct LogProcessor;

#[async_trait]
impl MessageProcessor for LogProcessor {
    async fn process(&self, message: &DeliveredMessage) -> anyhow::Result<()> {
        tracing::info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            enqueued_at = ?message.enqueued_at,
            "message received: {}",
            message.payload_text()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(payload: &[u8]) -> DeliveredMessage {
        DeliveredMessage {
            topic: "orders".into(),
            partition: 0,
            offset: 7,
            enqueued_at: DateTime::from_timestamp_millis(1_735_689_600_000),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_payload_text_keeps_content_verbatim() {
        assert_eq!(delivery(b"order-42").payload_text(), "order-42");
    }

    #[test]
    fn test_payload_text_degrades_binary_payloads() {
        let text = delivery(&[0xff, 0xfe, b'x']).payload_text();

        assert!(text.ends_with('x'));
    }

    #[tokio::test]
    async fn test_log_processor_accepts_any_payload() {
        let processor = LogProcessor;

        assert!(processor.process(&delivery(b"order-42")).await.is_ok());
        assert!(processor.process(&delivery(&[0x00, 0x01])).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_processor_is_idempotent_across_redelivery() {
        let processor = LogProcessor;
        let message = delivery(b"order-42");

        assert!(processor.process(&message).await.is_ok());
        assert!(processor.process(&message).await.is_ok());
    }
}
