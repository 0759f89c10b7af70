//! HPS central: proxy one HTTP call through a nearby BLE gateway.
//!
//! Scans for the named gateway, writes the request into its HPS
//! characteristics, triggers the fetch, and prints the response body to
//! stdout (or `--output`). Exits non-zero when no status notification
//! was received.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use hps_proxy::central::{ClientConfig, HpsClient, HpsRequest};
use hps_proxy::protocol::schema;
use hps_proxy::protocol::Method;
use hps_proxy::transport::btle::BtleplugRadio;

#[derive(Parser)]
#[command(name = "hps-central")]
#[command(about = "Issue an HTTP request through a BLE HTTP Proxy Service gateway")]
struct Cli {
    /// Device name to scan for.
    #[arg(long, default_value = schema::DEVICE_NAME)]
    name: String,

    /// URL to fetch, e.g. http://127.0.0.1:8100/hello.txt
    #[arg(long)]
    url: String,

    /// HTTP method: GET, HEAD, POST, PUT or DELETE.
    #[arg(short = 'X', long = "request", default_value = "GET")]
    request: String,

    /// Request header, repeatable. e.g. --header "Accept=text/plain"
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Request body for POST/PUT.
    #[arg(long)]
    data: Option<String>,

    /// Write the response body to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Response timeout in seconds (control write to notification).
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Connect timeout in seconds (scan start to connection).
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,
}

fn parse_header(raw: &str) -> Result<(String, String), hps_proxy::HpsError> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| hps_proxy::HpsError::InvalidHeader(raw.to_string()))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> hps_proxy::Result<()> {
    let method: Method = cli.request.parse()?;
    let mut request = HpsRequest::new(&cli.url, method)?;
    for (name, value) in &cli.headers {
        request = request.header(name, value);
    }
    if let Some(data) = cli.data {
        request = request.body(data.into_bytes());
    }

    let radio = BtleplugRadio::new().await?;
    let config = ClientConfig {
        device_name: cli.name,
        connect_timeout: Duration::from_secs(cli.connect_timeout),
        response_timeout: Duration::from_secs(cli.timeout),
    };
    let client = HpsClient::with_config(radio, config);

    let response = client.fetch(&request).await?;
    tracing::info!(
        status = response.status.status_code,
        headers_received = response.status.headers_received,
        headers_truncated = response.status.headers_truncated,
        body_received = response.status.body_received,
        body_truncated = response.status.body_truncated,
        "response received"
    );
    for (name, values) in response.headers.iter() {
        tracing::info!(header = name, value = %values.join(", "), "response header");
    }

    match cli.output {
        Some(path) => std::fs::write(path, &response.body)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
