use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webvitals_server::ServerConfig;

#[derive(Parser)]
#[command(name = "webvitals")]
#[command(about = "Web Vitals percentiles, time series and samples", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the query server
    Serve {
        /// Port for the HTTP API
        #[arg(short = 'p', long, default_value = "1990")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// TTL for ingested events in seconds
        #[arg(long, default_value = "86400")]
        ttl: u64,

        /// Width of a timeseries bucket in seconds
        #[arg(long, default_value = "3600")]
        bucket_secs: u64,

        /// Load seed data on startup for UI development
        #[arg(long)]
        seed: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            ttl,
            bucket_secs,
            seed,
        } => {
            webvitals_server::run_server(ServerConfig {
                host,
                port,
                ttl: Duration::from_secs(ttl),
                bucket_interval: Duration::from_secs(bucket_secs),
                seed,
            })
            .await
        }
    }
}
