//! # Message Audit Service
//!
//! Subscription-triggered handler that records the arrival of every message
//! delivered to its topic subscription. Startup resolves process
//! configuration from the remote settings store (ambient credentials, local
//! environment overrides) before the subscription binds; the process then
//! receives messages until a shutdown signal arrives.

mod config;
mod error;
mod handler;
mod logger;
mod settings;
mod shutdown;
mod subscriber;

use handler::LogProcessor;
use subscriber::{SubscriptionBinding, TopicSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_tracing()?;

    // Configuration must be fully resolved before any message handling; a
    // failure here exits non-zero without ever touching the broker.
    let app_config = config::resolve().await?;

    let binding = SubscriptionBinding::from_config(&app_config)?;
    let subscriber = TopicSubscriber::bind(&app_config.broker_servers, binding)?;

    tracing::info!(env = %app_config.env, "startup complete, receiving messages");

    let processor: handler::ImplMessageProcessor = Box::new(LogProcessor);

    subscriber
        .run(&processor, shutdown::wait_for_shutdown())
        .await
}
