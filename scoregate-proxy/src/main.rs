//! Scoregate Proxy - rate-limited gateway in front of a scoring service.
//!
//! ## Quick Start
//!
//! ```bash
//! # Start with defaults (port 8080, upstream https://score.hsborges.dev)
//! SCOREGATE_CLIENT_ID=my-client scoregate-proxy
//!
//! # Custom configuration
//! scoregate-proxy --port 9000 --upstream-url http://localhost:7000
//! ```
//!
//! ## Usage
//!
//! ```bash
//! curl -H 'x-priority: HIGH' -H 'x-client-id: acme' \
//!     'http://localhost:8080/proxy/score?cpf=12345678900'
//! ```

use clap::Parser;
use scoregate_proxy::{run_server, ServerConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "scoregate-proxy", version, about = "Rate-limited score gateway")]
struct Cli {
    /// Port to listen on (overrides SCOREGATE_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Base URL of the scoring service (overrides SCOREGATE_UPSTREAM_URL)
    #[arg(short, long)]
    upstream_url: Option<String>,

    /// Skip the startup banner
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scoregate_proxy=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let cli = Cli::parse();

    run_server(ServerConfig {
        port: cli.port,
        upstream_url: cli.upstream_url,
        print_banner: !cli.quiet,
    })
    .await
}
