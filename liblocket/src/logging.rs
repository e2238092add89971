//! Logging setup shared by the Locketdash binaries
//!
//! Output goes to stderr so that feed items and probe reports written to
//! stdout stay pipeable. Format and level come from `LOCKET_LOG_FORMAT` and
//! `LOCKET_LOG_LEVEL`; `RUST_LOG`, when set, wins over both the level and
//! `--verbose`.
//!
//! ```no_run
//! use liblocket::logging::{LogFormat, LogSettings};
//!
//! LogSettings {
//!     format: LogFormat::Json,
//!     level: "debug".to_string(),
//!     verbose: false,
//! }
//! .install();
//! ```

use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

pub const FORMAT_VAR: &str = "LOCKET_LOG_FORMAT";
pub const LEVEL_VAR: &str = "LOCKET_LOG_LEVEL";

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain lines, no colors
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
    /// Multi-line with source locations
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [LogFormat::Text, LogFormat::Json, LogFormat::Pretty]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown log format '{}' (expected text, json or pretty)", value))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the global subscriber should be set up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Filter directive, e.g. `info` or `liblocket=debug`
    pub level: String,
    /// Raise the level to `debug`
    pub verbose: bool,
}

impl LogSettings {
    /// Read [`FORMAT_VAR`] and [`LEVEL_VAR`]. An unparseable format falls back to text.
    pub fn from_env(verbose: bool) -> Self {
        let format = match std::env::var(FORMAT_VAR) {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                eprintln!("Warning: {}, using text logs", e);
                LogFormat::Text
            }),
            Err(_) => LogFormat::Text,
        };
        let level = std::env::var(LEVEL_VAR)
            .ok()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string());

        Self {
            format,
            level,
            verbose,
        }
    }

    /// The directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }

    /// Install the global subscriber; returns `false` if one was already set
    pub fn install(&self) -> bool {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Text => builder.with_target(false).with_ansi(false).try_init(),
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .try_init(),
        };
        installed.is_ok()
    }
}

/// Set up logging from the environment (see [`LogSettings::from_env`])
pub fn init_default(verbose: bool) {
    LogSettings::from_env(verbose).install();
}
