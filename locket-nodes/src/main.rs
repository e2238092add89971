//! locket-nodes - Health checks for the Locket backend nodes

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use liblocket::config::NodesConfig;
use liblocket::nodes::{format_uptime, NodeMonitor, NodeProber, NodeReport, NodeStatus};
use liblocket::settings::{verify_custom_backend, RefreshCooldown};
use liblocket::{Config, LocketError};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "locket-nodes")]
#[command(version, about = "Check the health of the Locket backend nodes")]
#[command(long_about = r#"Probe the Locket backend nodes and report whether they are up, how long
they took to answer, and the version and start time they report.

API nodes and the custom backend are probed at <url>/keepalive, the
database API at <url>/status. Anything but HTTP 200 within the timeout
counts as down.

EXAMPLES:
    # Check the nodes listed in the config file
    locket-nodes

    # Check explicit nodes
    locket-nodes --node https://api1.example.com --node https://api2.example.com

    # Machine-readable report
    locket-nodes --format json | jq '.api[] | select(.is_up == false) | .url'

    # Keep checking every minute (SIGHUP forces a re-check)
    locket-nodes --watch --interval 1m

    # Check a self-hosted backend before switching to it
    locket-nodes --verify https://my-node.example.com

EXIT CODES:
    0 - All nodes are up (or the backend passed --verify)
    1 - At least one node is down
    2 - Configuration error
    3 - Invalid input (no nodes to check, malformed or unreachable backend URL)
"#)]
struct Cli {
    /// API node base URL (repeatable, replaces nodes.api)
    #[arg(long = "node", value_name = "URL")]
    nodes: Vec<String>,

    /// Custom backend base URL (replaces nodes.custom)
    #[arg(long, value_name = "URL")]
    custom: Option<String>,

    /// Database API base URL (replaces nodes.database_url)
    #[arg(long, value_name = "URL")]
    database: Option<String>,

    /// Config file (default: $LOCKET_CONFIG, then ~/.config/locketdash/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Per-probe timeout, e.g. "5s" (overrides nodes.timeout_secs)
    #[arg(long, value_name = "DURATION", value_parser = non_zero_duration)]
    timeout: Option<Duration>,

    /// Keep checking until interrupted
    #[arg(short, long)]
    watch: bool,

    /// Time between checks in watch mode, e.g. "5m" (overrides nodes.interval_secs)
    #[arg(long, value_name = "DURATION", value_parser = non_zero_duration, requires = "watch")]
    interval: Option<Duration>,

    /// Validate and probe a custom backend URL, then exit
    #[arg(long, value_name = "URL", conflicts_with = "watch")]
    verify: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
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
    debug!("locket-nodes started with args: {:?}", cli);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let nodes = apply_overrides(config.nodes, &cli);
    let prober = NodeProber::new(cli.timeout.unwrap_or_else(|| nodes.timeout()))?;

    if let Some(input) = &cli.verify {
        let status = verify_custom_backend(&prober, input).await?;
        match cli.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&status)?),
            _ => println!("{}", status_line(&status, Utc::now())),
        }
        return Ok(());
    }

    if nodes.api.is_empty() && nodes.active_custom_url().is_none() && nodes.database_url.is_none() {
        return Err(LocketError::InvalidInput(
            "No nodes to check. Use --node or set nodes.api in the config file".to_string(),
        )
        .into());
    }

    if cli.watch {
        let interval = cli.interval.unwrap_or_else(|| nodes.interval());
        return watch(prober, nodes, interval, &cli.format).await;
    }

    let report = prober.check_nodes(&nodes).await;
    print_report(&report, &cli.format)?;
    if !report.all_up() {
        let down = report.nodes().filter(|node| !node.probe.is_up).count();
        anyhow::bail!("{} node(s) down", down);
    }
    Ok(())
}

/// A humantime duration such as "90s" or "5m"; zero is rejected
fn non_zero_duration(value: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Command-line node lists replace the configured ones
fn apply_overrides(mut nodes: NodesConfig, cli: &Cli) -> NodesConfig {
    if !cli.nodes.is_empty() {
        nodes.api = cli.nodes.clone();
    }
    if let Some(url) = &cli.custom {
        nodes.custom.enabled = true;
        nodes.custom.url = Some(url.clone());
    }
    if let Some(url) = &cli.database {
        nodes.database_url = Some(url.clone());
    }
    nodes
}

#[cfg(unix)]
async fn watch(prober: NodeProber, nodes: NodesConfig, interval: Duration, format: &str) -> anyhow::Result<()> {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;
    use std::time::Instant;

    let mut signals = Signals::new([SIGHUP, SIGINT, SIGTERM]).context("Signal setup failed")?;
    let handle = signals.handle();

    info!("Checking nodes every {}", humantime::format_duration(interval));
    let monitor = NodeMonitor::spawn(prober, nodes, interval)?;
    let mut reports = monitor.reports();
    let mut cooldown = RefreshCooldown::default();

    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    print_report(&report, format)?;
                }
            }
            Some(signal) = signals.next() => match signal {
                SIGHUP => {
                    let now = Instant::now();
                    if cooldown.try_begin(now) {
                        info!("Re-checking nodes");
                        monitor.refresh_now();
                    } else {
                        info!(
                            "Checked recently, wait {}s before checking again",
                            cooldown.remaining(now).as_secs().max(1)
                        );
                    }
                }
                _ => {
                    info!("Received shutdown signal, stopping");
                    break;
                }
            },
        }
    }

    handle.close();
    monitor.stop();
    Ok(())
}

#[cfg(not(unix))]
async fn watch(prober: NodeProber, nodes: NodesConfig, interval: Duration, format: &str) -> anyhow::Result<()> {
    info!("Checking nodes every {}", humantime::format_duration(interval));
    let monitor = NodeMonitor::spawn(prober, nodes, interval)?;
    let mut reports = monitor.reports();

    loop {
        tokio::select! {
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    print_report(&report, format)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, stopping");
                break;
            }
        }
    }

    monitor.stop();
    Ok(())
}

fn print_report(report: &NodeReport, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string(report)?),
        _ => {
            println!("Checked at {}", report.checked_at.format("%Y-%m-%d %H:%M:%S UTC"));
            for node in report.nodes() {
                println!("{}", status_line(node, report.checked_at));
            }
            println!();
        }
    }
    Ok(())
}

fn status_line(node: &NodeStatus, now: chrono::DateTime<Utc>) -> String {
    let symbol = if node.probe.is_up { "✓" } else { "✗" };
    format!(
        "{} {:<12} {}  latency {}  version {}  started {}",
        symbol,
        node.name,
        node.url,
        node.probe.latency_label(),
        node.probe.version,
        format_uptime(node.probe.uptime, now)
    )
}
