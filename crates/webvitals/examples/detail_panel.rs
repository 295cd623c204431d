use clap::Parser;
use std::sync::Arc;
use webvitals::{DetailPanel, PathRoutes, ViewContext, VitalsClient, WebVital};

/// Open the detail panel against a running server and print what it shows
#[derive(Parser)]
struct Args {
    /// Vital to open the panel on (lcp, fcp, cls, ttfb, fid)
    #[arg(default_value = "lcp")]
    vital: WebVital,

    /// Only samples of this transaction
    #[arg(short, long)]
    transaction: Option<String>,

    /// Server base url; defaults to $WEBVITALS_URL or http://localhost:1990
    #[arg(long)]
    url: Option<String>,

    /// Organization slug used in links
    #[arg(long, default_value = "acme")]
    org: String,

    /// Selected project slug
    #[arg(long)]
    project: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let client = match &args.url {
        Some(url) => VitalsClient::new(url)?,
        None => VitalsClient::from_env()?,
    };
    println!("🔌 Querying {}", client.base_url());

    let mut panel = DetailPanel::new(Arc::new(client));
    panel.set_transaction(args.transaction);
    panel.open(args.vital);
    let updates = panel.settle().await;
    println!("✅ {} results", updates.len());

    let routes = PathRoutes::new(args.org);
    let mut ctx = ViewContext::new(&routes);
    if let Some(project) = &args.project {
        ctx = ctx.with_project(project);
    }

    let view = panel.snapshot(&ctx);
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
