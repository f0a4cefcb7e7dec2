//! Remote settings store access.
//!
//! All remote settings for the process live under a single SSM Parameter
//! Store path prefix, named by the `APP_CONFIG_SSM_PATH` environment
//! variable. The store is read once at startup with ambient credentials from
//! the default AWS provider chain; a single fetch attempt, no caching.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_credential_types::provider::ProvideCredentials;

use crate::error::StartupError;

/// Environment variable naming the parameter path prefix that holds the
/// remote settings for this process.
pub const APP_CONFIG_SSM_PATH: &str = "APP_CONFIG_SSM_PATH";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetches every parameter under the configured path prefix, keyed by
    /// its normalized relative name.
    async fn fetch_all(&self) -> Result<HashMap<String, String>, StartupError>;
}

/// Parameter Store backed settings source.
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
    path: String,
}

impl SsmParameterStore {
    /// Acquires ambient credentials and prepares the Parameter Store client.
    ///
    /// Credential acquisition happens here, before any request to the store:
    /// a process without an ambient identity fails with
    /// [`StartupError::CredentialError`] without ever contacting the
    /// settings endpoint.
    pub async fn connect() -> Result<Self, StartupError> {
        let path = settings_path(std::env::var(APP_CONFIG_SSM_PATH).ok())?;

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let credentials = aws_config.credentials_provider().ok_or_else(|| {
            StartupError::CredentialError("no credential provider in the ambient AWS config".into())
        })?;
        credentials
            .provide_credentials()
            .await
            .map_err(|e| StartupError::CredentialError(e.to_string()))?;

        Ok(Self {
            client: aws_sdk_ssm::Client::new(&aws_config),
            path,
        })
    }
}

#[async_trait]
impl SettingsStore for SsmParameterStore {
    async fn fetch_all(&self) -> Result<HashMap<String, String>, StartupError> {
        let mut settings = HashMap::new();

        let mut paginator = self
            .client
            .get_parameters_by_path()
            .path(&self.path)
            .recursive(true)
            .with_decryption(true)
            .into_paginator()
            .send();

        while let Some(page) = paginator.next().await {
            let page =
                page.map_err(|e| StartupError::ConfigEndpointUnreachable(e.to_string()))?;

            for parameter in page.parameters() {
                let (Some(name), Some(value)) = (parameter.name(), parameter.value()) else {
                    continue;
                };
                settings.insert(normalize_key(&self.path, name), value.to_string());
            }
        }

        Ok(settings)
    }
}

/// Validates the settings path prefix taken from the environment.
fn settings_path(raw: Option<String>) -> Result<String, StartupError> {
    match raw {
        Some(path) if !path.trim().is_empty() => Ok(path),
        _ => Err(StartupError::ConfigEndpointMissing),
    }
}

/// Normalizes a parameter name relative to the path prefix into the
/// `UPPER_SNAKE` key space shared with environment overrides.
///
/// `/audit-messages/broker/topic` under the prefix `/audit-messages`
/// becomes `BROKER_TOPIC`.
fn normalize_key(prefix: &str, name: &str) -> String {
    name.strip_prefix(prefix)
        .unwrap_or(name)
        .trim_matches('/')
        .replace(['/', '-', '.'], "_")
        .to_uppercase()
}
