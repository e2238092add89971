//! Custom backend selection
//!
//! A self-hosted backend is only accepted when its URL is well-formed and
//! the node answers its keepalive probe. Manual re-checks are rate limited
//! by a short cooldown.

use reqwest::Url;
use std::time::{Duration, Instant};

use crate::error::{LocketError, Result};
use crate::nodes::{NodeKind, NodeProber, NodeStatus, ProbeMethod, KEEPALIVE_ENDPOINT};

/// Minimum time between two manual node checks
pub const REFRESH_COOLDOWN: Duration = Duration::from_secs(10);

/// Validate a custom backend URL: `http(s)://host[:port][/path]`
pub fn validate_backend_url(input: &str) -> Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LocketError::InvalidInput(
            "Backend URL cannot be empty".to_string(),
        ));
    }
    if input.chars().any(char::is_whitespace) {
        return Err(LocketError::InvalidInput(format!(
            "Backend URL must not contain whitespace: '{}'",
            input
        )));
    }

    let url = Url::parse(input)
        .map_err(|e| LocketError::InvalidInput(format!("Invalid backend URL '{}': {}", input, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(LocketError::InvalidInput(format!(
            "Backend URL must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(LocketError::InvalidInput(format!(
            "Backend URL has no host: '{}'",
            input
        )));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(LocketError::InvalidInput(
            "Backend URL must not embed credentials".to_string(),
        ));
    }

    Ok(url)
}

/// Validate `input` and probe it; succeeds only if the node is up
pub async fn verify_custom_backend(prober: &NodeProber, input: &str) -> Result<NodeStatus> {
    let url = validate_backend_url(input)?;
    let base = url.as_str().trim_end_matches('/');

    let status = prober
        .check(
            "Custom Node",
            NodeKind::Custom,
            base,
            KEEPALIVE_ENDPOINT,
            ProbeMethod::Head,
        )
        .await;

    if !status.probe.is_up {
        return Err(LocketError::InvalidInput(format!(
            "Backend {} is not responding; settings not saved",
            base
        )));
    }
    Ok(status)
}

/// Gate for manual "check again" requests
#[derive(Debug, Clone)]
pub struct RefreshCooldown {
    period: Duration,
    last_check: Option<Instant>,
}

impl RefreshCooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_check: None,
        }
    }

    /// Time left before another check is allowed
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_check {
            Some(last) => self.period.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Record a check at `now` if the cooldown has passed
    pub fn try_begin(&mut self, now: Instant) -> bool {
        if !self.remaining(now).is_zero() {
            return false;
        }
        self.last_check = Some(now);
        true
    }
}

impl Default for RefreshCooldown {
    fn default() -> Self {
        Self::new(REFRESH_COOLDOWN)
    }
}
