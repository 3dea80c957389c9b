use anyhow::Result;
use clap::Parser;
use tracing::info;

use wisp_server::{server, telemetry, Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging so the format is known
    let server_config = ServerConfig::from_env()
        .and_then(|config| config.with_cli(&cli))
        .map_err(|e| anyhow::anyhow!("Failed to load server configuration: {}", e))?;

    telemetry::init(server_config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to init telemetry: {}", e))?;

    info!("Wisp Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    server_config.log_config();

    server::start(server_config).await?;

    telemetry::shutdown();

    Ok(())
}
