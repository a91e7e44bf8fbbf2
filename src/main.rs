use tracing_subscriber::EnvFilter;
use wallet_bridge::{BridgeConfig, BridgeServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = if let Ok(path) = std::env::var("WALLET_BRIDGE_CONFIG") {
        BridgeConfig::from_toml(path)?
    } else {
        BridgeConfig::from_env()?
    };

    let bridge = BridgeServer::bind(config).await?;
    if let Some(url) = bridge.relay_url() {
        tracing::info!(%url, "Relay ready");
    }
    bridge.run().await?;

    Ok(())
}
