use std::net::SocketAddr;
use std::path::PathBuf;

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use treeserve::{AppState, Config, routes};

#[derive(Parser, Debug)]
#[command(name = "treeserve")]
#[command(about = "Serve a local directory tree over HTTP")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "TREESERVE_PORT", default_value = "8880")]
    port: u16,

    /// Address to bind to
    #[arg(short, long, env = "TREESERVE_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Root directory to serve files from
    #[arg(short, long, env = "TREESERVE_ROOT", default_value = ".")]
    root: PathBuf,

    /// TLS certificate (PEM); requires --tls-key
    #[arg(long, env = "TREESERVE_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// TLS private key (PEM); requires --tls-cert
    #[arg(long, env = "TREESERVE_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "TREESERVE_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "TREESERVE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "treeserve=debug,tower_http=debug"
    } else {
        "treeserve=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    if !cli.root.is_dir() {
        return Err(format!("Root path is not a directory: {}", cli.root.display()).into());
    }
    let root_dir = cli.root.canonicalize()?;

    info!("Build version: {}", env!("CARGO_PKG_VERSION"));
    info!("Serving files from: {}", root_dir.display());

    let state = AppState::with_config(root_dir, config)?;
    let app = routes::app(&state);

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    match (&cli.tls_cert, &cli.tls_key) {
        (Some(cert), Some(key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key).await?;
            info!("Listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            info!("Listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
