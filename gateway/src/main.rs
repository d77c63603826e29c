use std::net::SocketAddr;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use outcall_gateway::{routes, AppState, Settings};

/// Outcall Gateway - realtime outbound-call assistant server
#[derive(Parser, Debug)]
#[command(name = "outcall-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Override the listen port (otherwise PORT / MCP_PORT / 8000)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present, before settings are read.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env().map_err(|e| anyhow!(e.to_string()))?;
    if let Some(port) = cli.port {
        settings.port = port;
    }
    let address = settings.address();

    info!(
        public_url = %settings.public_url,
        carrier_configured = settings.twilio.is_configured(),
        model_configured = settings.model.api_key.is_some(),
        "starting outcall gateway"
    );

    let state = AppState::new(settings).await?;
    let app = routes::create_router(state);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("invalid listen address '{address}': {e}"))?;
    let listener = TcpListener::bind(&socket_addr)
        .await
        .with_context(|| format!("binding {socket_addr}"))?;
    info!("listening on http://{socket_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
