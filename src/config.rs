//! Process configuration resolution.
//!
//! Configuration is assembled once at startup from two ordered sources: the
//! remote settings store and the local process environment. The environment
//! wins on key collision, so any remote value can be overridden locally. The
//! resolved value is immutable for the lifetime of the process and is passed
//! explicitly to the components that need it.

use std::collections::HashMap;

use anyhow::Context;
use envconfig::Envconfig;

use crate::settings::{self, SettingsStore};

#[derive(Envconfig, Clone, Debug)]
pub struct AppConfig {
    /// Environment name the process is deployed to
    /// Values: "local", "dev", "staging", "prod"
    #[envconfig(default = "local")]
    pub env: String,

    /// Broker bootstrap servers, comma separated
    /// Example: "broker-1:9092,broker-2:9092"
    pub broker_servers: String,

    /// Topic the subscription is bound to
    pub broker_topic: String,

    /// Subscription receiving a copy of each message published to the topic
    pub broker_subscription: String,
}

/// Resolves the process configuration from the remote settings store merged
/// with local environment overrides.
///
/// Both network round trips (credential acquisition, settings fetch) complete
/// before this returns; the subscriber never starts on partial configuration.
pub async fn resolve() -> anyhow::Result<AppConfig> {
    let store = settings::SsmParameterStore::connect().await?;

    resolve_with(&store, std::env::vars().collect()).await
}

/// Merge and parse step, separated from store construction so the store can
/// be substituted in tests.
async fn resolve_with(
    store: &dyn SettingsStore,
    overrides: HashMap<String, String>,
) -> anyhow::Result<AppConfig> {
    let remote = store.fetch_all().await?;
    let merged = merge_settings(remote, overrides);

    AppConfig::init_from_hashmap(&merged)
        .context("merged configuration is missing required settings")
}

/// Overlays local environment values on the remote settings; the environment
/// wins for any key present in both sources.
fn merge_settings(
    remote: HashMap<String, String>,
    overrides: HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = remote;
    merged.extend(overrides);
    merged
}
