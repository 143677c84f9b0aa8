//! Obrolan - Gemini chat backend
//!
//! Serves the single-page conversation view's API:
//! - Streaming chat with Gemini 3 Pro, multimodal attachments
//! - On-demand image generation
//! - getHouseSales function calling against the live sales endpoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use obrolan::config::Config;
use obrolan::gateway::ChatGateway;
use obrolan::orchestrator::Orchestrator;
use obrolan::server::{self, AppState};
use obrolan::tools::DEFAULT_HOUSE_SALES_URL;

#[derive(Parser)]
#[command(name = "obrolan")]
#[command(about = "Gemini chat backend with image generation and live house-sales data")]
struct Args {
    /// HTTP server port (default: 3000)
    #[arg(long)]
    port: Option<u16>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY")]
    gemini_api_key: Option<String>,

    /// House-sales data endpoint
    #[arg(long, env = "HOUSE_SALES_URL")]
    house_sales_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from ~/.obrolan/.env or current dir)
    let env_path = dirs::home_dir()
        .map(|h| h.join(".obrolan").join(".env"))
        .filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    // Initialize logging
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    // Load config file (~/.obrolan/config.toml)
    let config = Config::load();

    // Resolve values: CLI args > env vars (handled by clap) > config file > defaults
    let api_key = args.gemini_api_key.or(config.gemini_api_key);
    let house_sales_url = args
        .house_sales_url
        .or(config.house_sales_url)
        .unwrap_or_else(|| DEFAULT_HOUSE_SALES_URL.to_string());
    let port = args.port.or(config.port).unwrap_or(3000);

    // A missing key is not fatal here; the first send reports it
    if api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; sends will fail until it is configured");
    }

    let gateway = ChatGateway::new(api_key, house_sales_url);
    let state = AppState::new(Orchestrator::new(gateway));

    server::run(port, state).await
}
