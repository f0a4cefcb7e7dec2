use derive_more::{Display, Error};

/// Failures that abort startup before the subscriber binds.
///
/// Each of these surfaces as a non-zero process exit; the receive loop is
/// never entered with partial configuration.
#[derive(Debug, Display, Error)]
pub enum StartupError {
    /// The well-known environment variable naming the remote settings
    /// namespace is unset, so there is nothing to bootstrap from.
    #[display("APP_CONFIG_SSM_PATH is not set; no remote settings store to read")]
    ConfigEndpointMissing,

    #[display("ambient credentials unavailable: {_0}")]
    CredentialError(#[error(not(source))] String),

    #[display("remote settings store unreachable: {_0}")]
    ConfigEndpointUnreachable(#[error(not(source))] String),

    #[display("invalid subscription binding: {_0}")]
    SubscriptionBindingInvalid(#[error(not(source))] String),
}
