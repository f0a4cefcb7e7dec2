//! Topic subscription binding and the receive loop.
//!
//! The subscriber owns the single broker connection. Offsets are committed
//! per message, only after the processor reports success; a processing
//! failure leaves the offset uncommitted so the broker redelivers from the
//! last acknowledged position (at-least-once).

use std::future::Future;

use anyhow::Context;
use chrono::DateTime;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};

use crate::config::AppConfig;
use crate::error::StartupError;
use crate::handler::{DeliveredMessage, ImplMessageProcessor};

/// Resolved (topic, subscription) pair the process binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionBinding {
    pub topic: String,
    pub subscription: String,
}

impl SubscriptionBinding {
    /// Validates the names resolved from configuration. Both must be
    /// non-blank before the subscriber may bind.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let topic = config.broker_topic.trim();
        let subscription = config.broker_subscription.trim();

        if topic.is_empty() {
            return Err(StartupError::SubscriptionBindingInvalid(
                "topic name is empty".into(),
            ));
        }
        if subscription.is_empty() {
            return Err(StartupError::SubscriptionBindingInvalid(
                "subscription name is empty".into(),
            ));
        }

        Ok(Self {
            topic: topic.to_string(),
            subscription: subscription.to_string(),
        })
    }
}

/// Long-lived consumer bound to one topic subscription.
pub struct TopicSubscriber {
    consumer: StreamConsumer,
    binding: SubscriptionBinding,
}

impl TopicSubscriber {
    /// Connects to the broker and registers interest in the bound topic.
    ///
    /// Commits are manual: a message only leaves the subscription once its
    /// processor invocation succeeded.
    pub fn bind(servers: &str, binding: SubscriptionBinding) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", servers)
            .set("group.id", &binding.subscription)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .create()
            .with_context(|| {
                format!(
                    "failed to create consumer for subscription {}",
                    binding.subscription
                )
            })?;

        consumer
            .subscribe(&[binding.topic.as_str()])
            .with_context(|| format!("failed to subscribe to topic {}", binding.topic))?;

        tracing::info!(
            servers = %servers,
            topic = %binding.topic,
            subscription = %binding.subscription,
            "subscription bound"
        );

        Ok(Self { consumer, binding })
    }

    /// Receives messages until `shutdown` resolves. Does not return under
    /// normal operation; this is the terminal activity of the process.
    ///
    /// The shutdown race sits between deliveries, so an in-flight processor
    /// invocation always runs to completion before the consumer is released.
    pub async fn run(
        self,
        processor: &ImplMessageProcessor,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                received = self.consumer.recv() => match received {
                    Ok(message) => {
                        let delivery = to_delivered(&message);
                        if dispatch(processor, &delivery).await {
                            self.acknowledge(&message);
                        }
                    }
                    Err(e) => {
                        // librdkafka reconnects on its own; transient
                        // transport errors never stop the loop.
                        tracing::warn!(error = %e, "broker receive error");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!(
            topic = %self.binding.topic,
            subscription = %self.binding.subscription,
            "subscriber stopped"
        );

        Ok(())
    }

    fn acknowledge(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!(
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "failed to commit delivery; the message may be redelivered"
            );
        }
    }
}

/// Invokes the processor for one delivery attempt and reports whether the
/// message should be acknowledged.
async fn dispatch(processor: &ImplMessageProcessor, delivery: &DeliveredMessage) -> bool {
    match processor.process(delivery).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                partition = delivery.partition,
                offset = delivery.offset,
                error = %e,
                "message processing failed; leaving delivery unacknowledged"
            );
            false
        }
    }
}

fn to_delivered(message: &BorrowedMessage<'_>) -> DeliveredMessage {
    DeliveredMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        enqueued_at: message
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis),
        payload: message.payload().unwrap_or_default().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockMessageProcessor;
    use envconfig::Envconfig;
    use std::collections::HashMap;

    fn test_config(topic: &str, subscription: &str) -> AppConfig {
        let entries = HashMap::from([
            ("BROKER_SERVERS".to_string(), "localhost:9092".to_string()),
            ("BROKER_TOPIC".to_string(), topic.to_string()),
            ("BROKER_SUBSCRIPTION".to_string(), subscription.to_string()),
        ]);

        AppConfig::init_from_hashmap(&entries).unwrap()
    }

    fn delivery(payload: &[u8]) -> DeliveredMessage {
        DeliveredMessage {
            topic: "orders".into(),
            partition: 1,
            offset: 42,
            enqueued_at: None,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_binding_resolves_from_config() {
        let binding = SubscriptionBinding::from_config(&test_config("orders", "billing")).unwrap();

        assert_eq!(binding.topic, "orders");
        assert_eq!(binding.subscription, "billing");
    }

    #[test]
    fn test_binding_rejects_empty_topic() {
        let result = SubscriptionBinding::from_config(&test_config("", "billing"));

        assert!(matches!(
            result,
            Err(StartupError::SubscriptionBindingInvalid(_))
        ));
    }

    #[test]
    fn test_binding_rejects_blank_subscription() {
        let result = SubscriptionBinding::from_config(&test_config("orders", "   "));

        assert!(matches!(
            result,
            Err(StartupError::SubscriptionBindingInvalid(_))
        ));
    }

    #[test]
    fn test_binding_trims_surrounding_whitespace() {
        let binding =
            SubscriptionBinding::from_config(&test_config(" orders ", " billing ")).unwrap();

        assert_eq!(binding.topic, "orders");
        assert_eq!(binding.subscription, "billing");
    }

    #[tokio::test]
    async fn test_dispatch_acknowledges_after_successful_processing() {
        let mut mock = MockMessageProcessor::new();
        mock.expect_process()
            .times(1)
            .withf(|message| message.payload == b"order-42")
            .returning(|_| Ok(()));
        let processor: ImplMessageProcessor = Box::new(mock);

        assert!(dispatch(&processor, &delivery(b"order-42")).await);
    }

    #[tokio::test]
    async fn test_dispatch_abandons_failed_processing() {
        let mut mock = MockMessageProcessor::new();
        mock.expect_process()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("downstream unavailable")));
        let processor: ImplMessageProcessor = Box::new(mock);

        assert!(!dispatch(&processor, &delivery(b"order-42")).await);
    }

    #[tokio::test]
    async fn test_dispatch_hands_over_the_exact_payload() {
        let payload = b"order-42 \xf0\x9f\x90\xb6".to_vec();
        let expected = payload.clone();

        let mut mock = MockMessageProcessor::new();
        mock.expect_process()
            .times(1)
            .withf(move |message| message.payload == expected)
            .returning(|_| Ok(()));
        let processor: ImplMessageProcessor = Box::new(mock);

        assert!(dispatch(&processor, &delivery(&payload)).await);
    }
}
