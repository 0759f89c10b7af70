//! HPS peripheral: the gateway between a BLE central and an IP network.
//!
//! Registers the HPS GATT application with BlueZ, advertises the
//! configured name, and proxies each triggered request to its origin
//! over HTTP. Runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use hps_proxy::peripheral::{ProxySession, UreqOrigin};
use hps_proxy::protocol::schema;
use hps_proxy::transport::bluez::BluezPeripheral;

#[derive(Parser)]
#[command(name = "hps-peripheral")]
#[command(about = "Advertise an HTTP Proxy Service gateway over BLE")]
struct Cli {
    /// Device name to advertise.
    #[arg(long, default_value = schema::DEVICE_NAME)]
    name: String,

    /// Timeout in seconds for outbound HTTP calls. Should match the
    /// response timeout the centrals use.
    #[arg(long, default_value_t = 30)]
    origin_timeout: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> hps_proxy::Result<()> {
    tracing::info!(name = %cli.name, "device name");

    let origin = Arc::new(UreqOrigin::new(Duration::from_secs(cli.origin_timeout)));
    let session = Arc::new(ProxySession::new(origin));

    let radio = BluezPeripheral::new().await?;
    let _gateway = radio.serve(&cli.name, session).await?;
    tracing::info!("gateway running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
