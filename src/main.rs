use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tidepool::announce::ChannelSet;
use tidepool::config::Config;
use tidepool::feed;
use tidepool::pocket::PocketClient;
use tidepool::scheduler::Scheduler;
use tidepool::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "tidepool",
    about = "Community blog aggregator and social announcer"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "tidepool.toml")]
    config: PathBuf,

    /// Run one feed-check tick and one dispatch tick, then exit
    #[arg(long)]
    once: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Locate and validate the feed for a site URL (registration helper)
    Discover {
        /// The site URL to scan for a feed
        site_url: String,
    },
}

fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("tidepool/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .context("Failed to build HTTP client")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let client = build_http_client()?;

    // The discover subcommand is interactive and needs no database
    if let Some(Command::Discover { site_url }) = &args.command {
        return discover(&client, site_url).await;
    }

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of tidepool appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let channels = Arc::new(ChannelSet::from_config(&config, &client));
    let pocket = PocketClient::from_config(&config, &client);
    let config = Arc::new(config);

    let scheduler = Scheduler::new(db, client, config, channels, pocket);

    if args.once {
        scheduler.run_once().await;
        return Ok(());
    }

    scheduler.run().await;
    Ok(())
}

/// Find a site's feed and check that it actually parses, reporting both
/// steps the way the registration flow would.
async fn discover(client: &reqwest::Client, site_url: &str) -> Result<()> {
    let info = match feed::discover(client, site_url).await {
        Ok(info) => info,
        Err(e) => {
            eprintln!("No feed found: {e}");
            std::process::exit(1);
        }
    };

    println!("Feed:  {}", info.feed_url);
    if let Some(title) = &info.title {
        println!("Title: {}", title);
    }

    let check = feed::check_feed_url(client, &info.feed_url).await;
    if check.ok {
        println!("Valid: yes");
    } else {
        println!(
            "Valid: no ({})",
            check.error.unwrap_or_else(|| "unknown".to_string())
        );
        std::process::exit(1);
    }

    Ok(())
}
