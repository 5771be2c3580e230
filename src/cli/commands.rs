//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use egress_scraper::content::{detect_widgets, WidgetDetection};
use egress_scraper::{
    normalize, plan_chain, PageMetadata, ProxyRegistry, ScrapeResult, Scraper, Settings, Strategy,
};

#[derive(Parser)]
#[command(name = "egress-scrape")]
#[command(about = "Capture rendered HTML through remote browsers with proxy fallback")]
#[command(version)]
pub struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "SCRAPER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch rendered HTML and metadata as JSON
    Fetch {
        /// URL to fetch (scheme optional)
        url: String,
        /// Leave the HTML out of the output
        #[arg(long)]
        no_html: bool,
    },

    /// Fetch a page and print it as markdown
    Markdown {
        /// URL to fetch (scheme optional)
        url: String,
    },

    /// Check whether a URL serves a document with HTTP 200
    Exists {
        /// URL to check (scheme optional)
        url: String,
        /// Include the captured HTML in the output
        #[arg(long)]
        content: bool,
    },

    /// Show the egress plans a fetch would try, without fetching
    Route {
        /// URL to plan for (scheme optional)
        url: String,
    },

    /// List dedicated proxies loaded from ISP_PROXY_* variables
    Proxies,
}

#[derive(Serialize)]
struct FetchOutput<'a> {
    url: &'a str,
    strategy: Strategy,
    metadata: &'a PageMetadata,
    widgets: WidgetDetection,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    let registry = Arc::new(ProxyRegistry::from_process_env());

    match cli.command {
        Commands::Fetch { url, no_html } => {
            let scraper = build_scraper(&settings, registry)?;
            cmd_fetch(&scraper, &url, no_html, cli.verbose).await
        }
        Commands::Markdown { url } => {
            let scraper = build_scraper(&settings, registry)?;
            cmd_markdown(&scraper, &url).await
        }
        Commands::Exists { url, content } => {
            let scraper = build_scraper(&settings, registry)?;
            cmd_exists(&scraper, &url, content).await
        }
        Commands::Route { url } => cmd_route(&registry, &url),
        Commands::Proxies => cmd_proxies(&registry),
    }
}

fn build_scraper(settings: &Settings, registry: Arc<ProxyRegistry>) -> anyhow::Result<Scraper> {
    Scraper::from_settings(settings, registry).context("Failed to set up browser provider")
}

async fn cmd_fetch(
    scraper: &Scraper,
    url: &str,
    no_html: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    let result: ScrapeResult = scraper
        .scrape(url)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    let output = FetchOutput {
        url: &result.metadata.url,
        strategy: result.strategy,
        metadata: &result.metadata,
        widgets: detect_widgets(&result.html),
        html: (!no_html).then_some(result.html.as_str()),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if verbose {
        eprintln!("{}", serde_json::to_string_pretty(&scraper.stats())?);
    }
    Ok(())
}

async fn cmd_markdown(scraper: &Scraper, url: &str) -> anyhow::Result<()> {
    let markdown = scraper
        .scrape_markdown(url)
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;
    println!("{}", markdown);
    Ok(())
}

async fn cmd_exists(scraper: &Scraper, url: &str, include_content: bool) -> anyhow::Result<()> {
    let mut check = scraper.check_exists(url).await;
    if !include_content {
        check.content = None;
    }
    println!("{}", serde_json::to_string_pretty(&check)?);
    Ok(())
}

fn cmd_route(registry: &ProxyRegistry, url: &str) -> anyhow::Result<()> {
    let url = normalize(url)?;
    println!("{}", url);
    for (index, step) in plan_chain(&url, registry).iter().enumerate() {
        println!("  {}. {:<9} {}", index + 1, step.strategy.as_str(), step.plan);
    }
    Ok(())
}

fn cmd_proxies(registry: &ProxyRegistry) -> anyhow::Result<()> {
    if registry.is_empty() {
        println!("No dedicated proxies configured (set ISP_PROXY_<COUNTRY>=ip:port:user:pass)");
        return Ok(());
    }

    for endpoint in registry.endpoints() {
        println!("{}  user={}", endpoint, endpoint.username);
    }
    Ok(())
}
