//! Demo static file server for exercising the proxy end to end.
//!
//! Serves files from `--root` on `--port` (8100 by default), matching
//! the origin the central examples point at:
//!
//! ```text
//! hps-fileserver --root ./www &
//! hps-central --url http://127.0.0.1:8100/hello.txt
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;

#[derive(Parser)]
#[command(name = "hps-fileserver")]
#[command(about = "Serve static files for HPS demos")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8100)]
    port: u16,

    /// Directory to serve.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

fn app(root: PathBuf) -> Router {
    Router::new()
        .fallback(get(serve_file))
        .with_state(Arc::new(root))
}

async fn serve_file(State(root): State<Arc<PathBuf>>, uri: Uri) -> impl IntoResponse {
    let relative = uri.path().trim_start_matches('/');
    if relative.split('/').any(|segment| segment == "..") {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    }

    let path = root.join(relative);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            tracing::info!(path = %path.display(), len = bytes.len(), "serving file");
            ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "file not found");
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        _ => "application/octet-stream",
    }
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
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port = cli.port, %err, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(port = cli.port, root = %cli.root.display(), "file server listening");

    if let Err(err) = axum::serve(listener, app(cli.root)).await {
        tracing::error!(%err, "server error");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type(Path::new("hello.txt")), "text/plain");
        assert_eq!(content_type(Path::new("index.html")), "text/html");
        assert_eq!(content_type(Path::new("blob.bin")), "application/octet-stream");
        assert_eq!(content_type(Path::new("no_extension")), "application/octet-stream");
    }
}
