//! Backend node health probing
//!
//! Each node is probed with a single request to `<url>/<endpoint>` and a
//! fixed timeout. A probe never fails: anything other than an HTTP 200 (or
//! no answer at all) just marks the node as down. Nodes reporting
//! `{ "version": ..., "uptime": ... }` in their body get those fields shown.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::NodesConfig;
use crate::error::{ConfigError, FeedError, Result};

/// Liveness endpoint of API nodes and the custom backend
pub const KEEPALIVE_ENDPOINT: &str = "keepalive";

/// Liveness endpoint of the database API
pub const STATUS_ENDPOINT: &str = "status";

/// Shown for fields a node did not report
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Api,
    Custom,
    #[serde(rename = "db")]
    Database,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Api => write!(f, "api"),
            NodeKind::Custom => write!(f, "custom"),
            NodeKind::Database => write!(f, "db"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Head,
    Get,
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Probe {
    pub is_up: bool,
    /// Round-trip time; `None` when the node did not answer
    #[serde(with = "latency_ms")]
    pub latency: Option<Duration>,
    pub version: String,
    /// Unix timestamp (seconds) the node reports as its start time; 0 if unknown
    pub uptime: i64,
}

impl Probe {
    fn down() -> Self {
        Self {
            is_up: false,
            latency: None,
            version: NOT_AVAILABLE.to_string(),
            uptime: 0,
        }
    }

    /// `"123ms"`, or `"N/A"` when the node did not answer
    pub fn latency_label(&self) -> String {
        match self.latency {
            Some(latency) => format!("{}ms", latency.as_millis()),
            None => NOT_AVAILABLE.to_string(),
        }
    }
}

/// A probed node, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub name: String,
    pub kind: NodeKind,
    pub url: String,
    #[serde(flatten)]
    pub probe: Probe,
}

/// One full round of checks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub database: Option<NodeStatus>,
    pub custom: Option<NodeStatus>,
    pub api: Vec<NodeStatus>,
    pub checked_at: DateTime<Utc>,
}

impl NodeReport {
    /// Nodes in display order: database, custom backend, then API nodes
    pub fn nodes(&self) -> impl Iterator<Item = &NodeStatus> {
        self.database
            .iter()
            .chain(self.custom.iter())
            .chain(self.api.iter())
    }

    pub fn all_up(&self) -> bool {
        self.nodes().all(|node| node.probe.is_up)
    }
}

/// Issues health probes with a shared HTTP client
#[derive(Clone)]
pub struct NodeProber {
    client: reqwest::Client,
}

impl NodeProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    /// Probe `<base_url>/<endpoint>` and time the round trip
    pub async fn measure_latency(&self, base_url: &str, endpoint: &str, method: ProbeMethod) -> Probe {
        let url = probe_url(base_url, endpoint);
        let request = match method {
            ProbeMethod::Head => self.client.head(&url),
            ProbeMethod::Get => self.client.get(&url),
        };

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(%url, "Probe failed: {}", e);
                return Probe::down();
            }
        };
        let latency = started.elapsed();
        let is_up = response.status() == reqwest::StatusCode::OK;

        // HEAD responses have no body; a GET body that fails to read is ignored
        let body = match method {
            ProbeMethod::Get => response.bytes().await.ok(),
            ProbeMethod::Head => None,
        };
        let (version, uptime) = body
            .as_deref()
            .map(parse_node_info)
            .unwrap_or_else(|| (NOT_AVAILABLE.to_string(), 0));

        Probe {
            is_up,
            latency: Some(latency),
            version,
            uptime,
        }
    }

    /// Probe a node and label the result
    pub async fn check(
        &self,
        name: &str,
        kind: NodeKind,
        base_url: &str,
        endpoint: &str,
        method: ProbeMethod,
    ) -> NodeStatus {
        let probe = self.measure_latency(base_url, endpoint, method).await;
        if !probe.is_up {
            warn!("{} ({}) is down", name, base_url);
        }
        NodeStatus {
            name: name.to_string(),
            kind,
            url: base_url.to_string(),
            probe,
        }
    }

    /// Check every configured node; API nodes are probed concurrently
    pub async fn check_nodes(&self, config: &NodesConfig) -> NodeReport {
        let api_checks = config.api.iter().enumerate().map(|(index, url)| {
            let name = format!("Node {}", index + 1);
            async move {
                self.check(&name, NodeKind::Api, url, KEEPALIVE_ENDPOINT, ProbeMethod::Get)
                    .await
            }
        });
        let api = join_all(api_checks).await;

        let custom = match config.active_custom_url() {
            Some(url) => Some(
                self.check(
                    "Custom Node",
                    NodeKind::Custom,
                    url,
                    KEEPALIVE_ENDPOINT,
                    ProbeMethod::Get,
                )
                .await,
            ),
            None => None,
        };

        let database = match config.database_url.as_deref() {
            Some(url) => Some(
                self.check(
                    "Database",
                    NodeKind::Database,
                    url,
                    STATUS_ENDPOINT,
                    ProbeMethod::Get,
                )
                .await,
            ),
            None => None,
        };

        let report = NodeReport {
            database,
            custom,
            api,
            checked_at: Utc::now(),
        };
        info!(
            nodes = report.nodes().count(),
            up = report.nodes().filter(|node| node.probe.is_up).count(),
            "Node check finished"
        );
        report
    }
}

/// Re-runs [`NodeProber::check_nodes`] on a fixed interval
pub struct NodeMonitor {
    reports: watch::Receiver<Option<NodeReport>>,
    refresh: tokio::sync::mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl NodeMonitor {
    /// Start checking now and then every `interval`, which must not be zero
    pub fn spawn(prober: NodeProber, config: NodesConfig, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "interval".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        let (report_tx, reports) = watch::channel(None);
        let (refresh, mut refresh_rx) = tokio::sync::mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    Some(()) = refresh_rx.recv() => {
                        debug!("Refresh requested");
                        ticker.reset();
                    }
                }
                let report = prober.check_nodes(&config).await;
                if report_tx.send(Some(report)).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            reports,
            refresh,
            task,
        })
    }

    /// Receiver that sees every new report
    pub fn reports(&self) -> watch::Receiver<Option<NodeReport>> {
        self.reports.clone()
    }

    pub fn latest(&self) -> Option<NodeReport> {
        self.reports.borrow().clone()
    }

    /// Run a check now instead of waiting for the next tick
    pub fn refresh_now(&self) {
        // A full queue means a refresh is already pending
        let _ = self.refresh.try_send(());
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

fn probe_url(base_url: &str, endpoint: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), endpoint)
}

/// Pull `version` and `uptime` out of a probe body, tolerating anything
fn parse_node_info(body: &[u8]) -> (String, i64) {
    let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    let version = match value.get("version") {
        Some(Value::String(version)) if !version.is_empty() => version.clone(),
        Some(Value::Number(version)) => version.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    };
    let uptime = value
        .get("uptime")
        .and_then(|uptime| uptime.as_i64().or_else(|| uptime.as_f64().map(|f| f as i64)))
        .unwrap_or(0);

    (version, uptime)
}

/// Describe how long ago `uptime` (a Unix timestamp in seconds) was.
///
/// Months are 30 days and years 12 months. A zero timestamp is `"N/A"`.
pub fn format_uptime(uptime: i64, now: DateTime<Utc>) -> String {
    if uptime == 0 {
        return NOT_AVAILABLE.to_string();
    }

    let seconds = (now.timestamp() - uptime).max(0);
    if seconds < 60 {
        return ago(seconds, "second");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return ago(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return ago(hours, "hour");
    }
    let days = hours / 24;
    if days < 30 {
        return ago(days, "day");
    }
    let months = days / 30;
    if months < 12 {
        return ago(months, "month");
    }
    ago(months / 12, "year")
}

fn ago(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}

mod latency_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(latency: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match latency {
            Some(latency) => serializer.serialize_u64(latency.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocketError;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_uptime_units() {
        let now = now();
        let t = now.timestamp();
        assert_eq!(format_uptime(t - 1, now), "1 second ago");
        assert_eq!(format_uptime(t - 45, now), "45 seconds ago");
        assert_eq!(format_uptime(t - 60, now), "1 minute ago");
        assert_eq!(format_uptime(t - 3 * 3600, now), "3 hours ago");
        assert_eq!(format_uptime(t - 2 * 86400, now), "2 days ago");
        assert_eq!(format_uptime(t - 45 * 86400, now), "1 month ago");
        assert_eq!(format_uptime(t - 400 * 86400, now), "1 year ago");
        assert_eq!(format_uptime(t - 800 * 86400, now), "2 years ago");
    }

    #[test]
    fn test_format_uptime_unknown() {
        assert_eq!(format_uptime(0, now()), "N/A");
    }

    #[test]
    fn test_format_uptime_clock_skew() {
        // A start time in the future reads as "just now"
        let now = now();
        assert_eq!(format_uptime(now.timestamp() + 30, now), "0 seconds ago");
    }

    #[test]
    fn test_parse_node_info() {
        assert_eq!(
            parse_node_info(br#"{"version":"1.4.2","uptime":1700000000}"#),
            ("1.4.2".to_string(), 1_700_000_000)
        );
        assert_eq!(
            parse_node_info(br#"{"version":2,"uptime":1700000000.7}"#),
            ("2".to_string(), 1_700_000_000)
        );
        assert_eq!(parse_node_info(b"OK"), ("N/A".to_string(), 0));
        assert_eq!(parse_node_info(b"{}"), ("N/A".to_string(), 0));
    }

    #[test]
    fn test_probe_url_joins_cleanly() {
        assert_eq!(
            probe_url("https://node.example.com/", KEEPALIVE_ENDPOINT),
            "https://node.example.com/keepalive"
        );
        assert_eq!(
            probe_url("https://db.example.com/api", STATUS_ENDPOINT),
            "https://db.example.com/api/status"
        );
    }

    #[test]
    fn test_latency_label() {
        let mut probe = Probe::down();
        assert_eq!(probe.latency_label(), "N/A");
        probe.latency = Some(Duration::from_millis(87));
        assert_eq!(probe.latency_label(), "87ms");
    }

    #[test]
    fn test_node_status_serialization() {
        let status = NodeStatus {
            name: "Node 1".to_string(),
            kind: NodeKind::Database,
            url: "https://db.example.com".to_string(),
            probe: Probe {
                is_up: true,
                latency: Some(Duration::from_millis(42)),
                version: "3.1".to_string(),
                uptime: 1_700_000_000,
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["kind"], "db");
        assert_eq!(json["latency"], 42);
        assert_eq!(json["is_up"], true);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_down() {
        let prober = NodeProber::new(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on localhost is closed in test environments
        let probe = prober
            .measure_latency("http://127.0.0.1:9", KEEPALIVE_ENDPOINT, ProbeMethod::Head)
            .await;
        assert!(!probe.is_up);
        assert_eq!(probe.latency_label(), "N/A");
        assert_eq!(probe.version, "N/A");
    }

    #[tokio::test]
    async fn test_check_nodes_with_nothing_configured() {
        let prober = NodeProber::new(Duration::from_millis(500)).unwrap();
        let report = prober.check_nodes(&NodesConfig::default()).await;
        assert_eq!(report.nodes().count(), 0);
        assert!(report.all_up());
    }

    #[test]
    fn test_monitor_rejects_zero_interval() {
        let prober = NodeProber::new(Duration::from_secs(1)).unwrap();
        let result = NodeMonitor::spawn(prober, NodesConfig::default(), Duration::ZERO);
        assert!(matches!(
            result,
            Err(LocketError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_ticks_and_refreshes() {
        let interval = Duration::from_secs(120);
        let prober = NodeProber::new(Duration::from_secs(1)).unwrap();
        let monitor = NodeMonitor::spawn(prober, NodesConfig::default(), interval).unwrap();
        let mut reports = monitor.reports();
        let started = tokio::time::Instant::now();

        // First check runs right away
        reports.changed().await.unwrap();
        assert!(started.elapsed() < interval);
        assert!(monitor.latest().is_some());

        // Next one waits for the interval
        reports.changed().await.unwrap();
        assert!(started.elapsed() >= interval);

        // A refresh does not wait for the next tick
        let refreshed = tokio::time::Instant::now();
        monitor.refresh_now();
        reports.changed().await.unwrap();
        assert!(refreshed.elapsed() < interval);

        monitor.stop();
        assert!(reports.changed().await.is_err());
    }
}
