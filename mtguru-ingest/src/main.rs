use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use mtguru_ingest::{load_cards, run_ingest, IngestClient, DEFAULT_CONCURRENCY};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bulk-load Scryfall card data into the MTGuru vector index")]
struct Args {
    /// Path to a Scryfall bulk-data JSON file (oracle cards export)
    #[arg(short, long)]
    file: PathBuf,

    /// MTGuru server URL
    #[arg(long, env = "MTGURU_HTTP_URL", default_value = "http://127.0.0.1:8787")]
    server: String,

    /// Number of in-flight card uploads
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let cards = load_cards(&args.file)?;
    tracing::info!(count = cards.len(), file = %args.file.display(), "Loaded cards");

    let client = IngestClient::new(&args.server)?;
    let report = run_ingest(&client, cards, args.concurrency).await;

    if report.failed > 0 {
        anyhow::bail!("{} card uploads failed", report.failed);
    }

    Ok(())
}
