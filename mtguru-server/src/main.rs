use std::sync::Arc;

use clap::Parser;
use mtguru_core::MtguruConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use mtguru_server::http;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "mtguru.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match MtguruConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging — RUST_LOG wins over the configured level
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    // Build upstream clients
    let state = match http::AppState::from_config(config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to initialise upstream clients: {}", e);
            std::process::exit(1);
        }
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
