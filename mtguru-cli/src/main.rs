//! mtguru-cli — natural-language card search against a running MTGuru server
//!
//! # Subcommands
//! - `search <query> [--set-type ..] [--color ..] [--rarity ..] [--json]` — semantic card search
//! - `status`                                                             — show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "mtguru-cli",
    version,
    about = "MTGuru — search Magic: The Gathering cards using natural language"
)]
struct Cli {
    /// MTGuru HTTP server URL (overrides MTGURU_HTTP_URL env var)
    #[arg(long, env = "MTGURU_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search for cards by describing what they do
    Search {
        /// Query text to search for
        query: String,

        /// Restrict matches to a set type (e.g. expansion, core)
        #[arg(long)]
        set_type: Option<String>,

        /// Restrict matches to a color (word form, e.g. Blue)
        #[arg(long)]
        color: Option<String>,

        /// Restrict matches to a rarity (e.g. common, rare, mythic)
        #[arg(long)]
        rarity: Option<String>,

        /// Output the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show MTGuru server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// One card match from the MTGuru search API
#[derive(Debug, Deserialize)]
pub struct CliMatch {
    pub id: String,
    pub score: f64,
    pub metadata: CliCardMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct CliCardMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub set_name: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub scryfall_uri: String,
}

/// The full search response from POST /api/search
#[derive(Debug, Deserialize)]
pub struct CliSearchResponse {
    pub count: usize,
    pub matches: Vec<CliMatch>,
}

// ============================================================================
// Formatting
// ============================================================================

/// Render a similarity score as a whole percentage.
pub fn score_percent(score: f64) -> String {
    format!("{:.0}%", score * 100.0)
}

/// Human-readable rendering of one match.
pub fn format_match(m: &CliMatch) -> String {
    let mut line = m.metadata.name.clone();
    if !m.metadata.set_name.is_empty() {
        line.push_str(&format!(" — {}", m.metadata.set_name));
    }
    if !m.metadata.rarity.is_empty() {
        line.push_str(&format!(" ({})", m.metadata.rarity));
    }
    format!(
        "{}\nScore:  {}\n{}\n",
        line,
        score_percent(m.score),
        m.metadata.scryfall_uri
    )
}

/// Build the /api/search request body. Absent filters are sent as empty
/// strings, matching what the browser client sends.
pub fn build_search_body(
    query: &str,
    set_type: Option<&str>,
    color: Option<&str>,
    rarity: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "query": query,
        "filters": {
            "set_type": set_type.unwrap_or_default(),
            "colors": color.unwrap_or_default(),
            "rarity": rarity.unwrap_or_default(),
        }
    })
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn do_search(
    server: &str,
    query: &str,
    set_type: Option<&str>,
    color: Option<&str>,
    rarity: Option<&str>,
    json_output: bool,
) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let url = format!("{}/api/search", server);
    let body = build_search_body(query, set_type, color, rarity);

    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("mtguru-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("mtguru-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    if json_output {
        let raw: serde_json::Value = match resp.json() {
            Ok(v) => v,
            Err(e) => {
                eprintln!("mtguru-cli: failed to parse search response: {}", e);
                std::process::exit(1);
            }
        };
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let search_resp: CliSearchResponse = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("mtguru-cli: failed to parse search response: {}", e);
            std::process::exit(1);
        }
    };

    if search_resp.matches.is_empty() {
        eprintln!("No cards found for: {}", query);
        return Ok(());
    }

    for m in &search_resp.matches {
        println!("{}", format_match(m));
    }

    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("MTGuru server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
            println!("Embedding:     {}", body["embedding_model"].as_str().unwrap_or("?"));
            println!("Index:         {}", body["index"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("mtguru-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("mtguru-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Search {
            query,
            set_type,
            color,
            rarity,
            json,
        } => do_search(
            &server,
            &query,
            set_type.as_deref(),
            color.as_deref(),
            rarity.as_deref(),
            json,
        ),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("mtguru-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
