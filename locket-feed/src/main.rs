//! locket-feed - Page through the Locket caption feed

use anyhow::Context;
use clap::Parser;
use liblocket::feed::{FeedController, HttpFeedSource, LoaderSettings, Notice};
use liblocket::{Config, FeedError, FeedView, LocketError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "locket-feed")]
#[command(version, about = "Page through the Locket caption feed")]
#[command(long_about = r#"Load the Locket caption feed page by page, the way the dashboard does.

Failed requests are retried automatically (3 times, 1s/2s/4s apart). When
all retries fail the loader stops; --manual-retries restarts it with a fresh
retry budget, like pressing "Try again" in the dashboard.

EXAMPLES:
    # First page, using feed.url from the config file
    locket-feed

    # Three pages from an explicit endpoint
    locket-feed --url https://api.example.com/captions --pages 3

    # Everything, one JSON object per line
    locket-feed --all --format jsonl | jq -r '.caption'

    # Keep trying through a flaky backend
    locket-feed --all --manual-retries 2

OUTPUT FORMATS:
    text  - One line per caption: id and caption text (default)
    json  - Object with the items and whether more pages exist
    jsonl - One caption object per line (streaming-friendly)

EXIT CODES:
    0 - Success (including an empty feed)
    1 - The feed could not be loaded
    2 - Configuration error (missing or invalid feed URL, bad config file)
"#)]
struct Cli {
    /// Feed endpoint (overrides feed.url)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Config file (default: $LOCKET_CONFIG, then ~/.config/locketdash/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of pages to load
    #[arg(short, long, default_value = "1", value_name = "N", conflicts_with = "all")]
    pages: usize,

    /// Load until the end of the feed
    #[arg(short, long)]
    all: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Restart loading this many times after retries are exhausted
    #[arg(long, default_value = "0", value_name = "N")]
    manual_retries: u32,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// How a loading session ended
#[derive(Debug, PartialEq)]
enum Outcome {
    PageLimit,
    EndOfFeed,
    Failed(String),
}

#[derive(Serialize)]
struct FeedOutput<'a> {
    items: Vec<&'a serde_json::Value>,
    has_more: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    liblocket::logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        let code = e.downcast_ref::<LocketError>().map_or(1, LocketError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    debug!("locket-feed started with args: {:?}", cli);

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(url) = cli.url.clone() {
        config.feed.url = Some(url);
    }

    let source = HttpFeedSource::from_config(&config.feed)?;
    info!(url = %source.url(), "Loading feed");

    let controller = FeedController::spawn(Arc::new(source), LoaderSettings::from(&config.feed));
    let page_limit = if cli.all { None } else { Some(cli.pages.max(1)) };
    let outcome = drive(&controller, page_limit, cli.manual_retries).await;

    let view = controller.view();
    controller.teardown().await;

    print_items(&view, &cli.format).context("Failed to write output")?;

    match outcome {
        Outcome::Failed(message) => Err(LocketError::from(FeedError::Unavailable(message)).into()),
        Outcome::PageLimit | Outcome::EndOfFeed => Ok(()),
    }
}

/// Mount the loader and follow its notices until the session is over
async fn drive(controller: &FeedController, page_limit: Option<usize>, manual_retries: u32) -> Outcome {
    let mut notices = controller.subscribe();
    let mut manual_left = manual_retries;
    let mut pages = 0;

    controller.mount();
    loop {
        let notice = match notices.recv().await {
            Ok(notice) => notice,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} loader notices", skipped);
                continue;
            }
            Err(RecvError::Closed) => return Outcome::Failed("Feed loader stopped".to_string()),
        };

        match notice {
            Notice::FetchStarted { cursor, retry_attempt } => {
                debug!(?cursor, retry_attempt, "Requesting page");
            }
            Notice::PageAppended { count, total, has_more } => {
                pages += 1;
                info!("Page {}: {} new items ({} total)", pages, count, total);
                if page_limit.is_some_and(|limit| pages >= limit) {
                    return Outcome::PageLimit;
                }
                if has_more {
                    // Scrolled to the bottom; the loader takes it from here
                    controller.set_sentinel_visible(true);
                }
            }
            Notice::EndOfFeed { total } => {
                info!("End of feed after {} items", total);
                return Outcome::EndOfFeed;
            }
            Notice::RetryScheduled {
                attempt,
                max_retries,
                delay_ms,
                error,
            } => {
                warn!(
                    "Request failed ({}), retry {}/{} in {}ms",
                    error, attempt, max_retries, delay_ms
                );
            }
            Notice::Failed { error, cause } => {
                debug!("Last request error: {}", cause);
                if manual_left == 0 {
                    return Outcome::Failed(error);
                }
                manual_left -= 1;
                warn!("{} Retrying ({} manual retries left)", error, manual_left);
                controller.manual_retry();
            }
        }
    }
}

fn print_items(view: &FeedView, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            let output = FeedOutput {
                items: view.items.iter().map(|item| item.as_json()).collect(),
                has_more: view.has_more,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "jsonl" => {
            for item in &view.items {
                println!("{}", serde_json::to_string(item.as_json())?);
            }
        }
        _ => {
            for item in &view.items {
                println!(
                    "{} | {}",
                    item.id().unwrap_or("-"),
                    preview(item.caption().unwrap_or(""), 60)
                );
            }
        }
    }
    Ok(())
}

/// Shorten `text` to `max` characters
fn preview(text: &str, max: usize) -> String {
    let text = text.replace('\n', " ");
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text
    }
}
