use tracing_subscriber::EnvFilter;

/// Installs the stdout tracing subscriber. `RUST_LOG` narrows the filter;
/// the default keeps informational records (one per delivered message).
pub fn setup_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?)
}
