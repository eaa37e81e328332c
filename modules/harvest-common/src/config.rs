use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{HarvestError, Result};

/// Item cap applied in demo mode when no smaller cap is configured.
pub const DEMO_ITEM_CAP: usize = 5;
/// Detail cap applied in demo mode when no smaller limit is configured.
pub const DEMO_DETAIL_LIMIT: usize = 3;

/// How the collector waits for lazily rendered rows after a reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleMode {
    /// Sleep for the settle interval.
    Fixed,
    /// Poll the visible item count every settle interval until two
    /// consecutive checks agree.
    Stable,
}

impl FromStr for SettleMode {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(SettleMode::Fixed),
            "stable" => Ok(SettleMode::Stable),
            other => Err(HarvestError::Config(format!(
                "unknown settle mode '{other}' (expected fixed|stable)"
            ))),
        }
    }
}

/// Options the traversal itself consumes: termination policy, settle
/// behaviour, timeouts and detail extraction.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub cutoff_date: Option<NaiveDate>,
    pub item_count_cap: Option<usize>,
    pub max_scroll_iterations: u32,
    pub no_progress_threshold: u32,
    pub demo_mode: bool,
    pub settle_interval: Duration,
    pub settle_mode: SettleMode,
    pub action_timeout: Duration,
    /// Budget for reading one opened conversation. Long threads need far
    /// more than a single browser action.
    pub extract_timeout: Duration,
    pub ready_timeout: Duration,
    pub full_history: bool,
    pub detail_limit: Option<usize>,
    /// Handle of the account owner, when the session collaborator resolved it.
    pub own_identity: Option<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            cutoff_date: None,
            item_count_cap: None,
            max_scroll_iterations: 200,
            no_progress_threshold: 3,
            demo_mode: false,
            settle_interval: Duration::from_millis(2000),
            settle_mode: SettleMode::Fixed,
            action_timeout: Duration::from_millis(15_000),
            extract_timeout: Duration::from_millis(300_000),
            ready_timeout: Duration::from_millis(30_000),
            full_history: false,
            detail_limit: None,
            own_identity: None,
        }
    }
}

impl HarvestConfig {
    /// Item cap after demo mode is applied.
    pub fn effective_item_cap(&self) -> Option<usize> {
        if self.demo_mode {
            Some(self.item_count_cap.map_or(DEMO_ITEM_CAP, |cap| cap.min(DEMO_ITEM_CAP)))
        } else {
            self.item_count_cap
        }
    }

    /// Maximum number of conversations opened for full history.
    pub fn effective_detail_limit(&self) -> Option<usize> {
        if !self.full_history {
            return Some(0);
        }
        if self.demo_mode {
            Some(
                self.detail_limit
                    .map_or(DEMO_DETAIL_LIMIT, |limit| limit.min(DEMO_DETAIL_LIMIT)),
            )
        } else {
            self.detail_limit
        }
    }
}

/// Application configuration loaded from `HARVEST_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Browser
    pub webdriver_url: String,
    pub inbox_url: String,

    // Output
    pub output_dir: PathBuf,
    pub selectors_path: Option<PathBuf>,
    pub json_logs: bool,

    // Traversal
    pub harvest: HarvestConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = HarvestConfig::default();

        let harvest = HarvestConfig {
            cutoff_date: parse_var(&lookup, "HARVEST_CUTOFF_DATE", parse_date)?,
            item_count_cap: parse_var(&lookup, "HARVEST_ITEM_CAP", parse_number)?,
            max_scroll_iterations: parse_var(&lookup, "HARVEST_MAX_SCROLLS", parse_number)?
                .unwrap_or(defaults.max_scroll_iterations),
            no_progress_threshold: parse_var(
                &lookup,
                "HARVEST_NO_PROGRESS_THRESHOLD",
                parse_number,
            )?
            .unwrap_or(defaults.no_progress_threshold),
            demo_mode: parse_var(&lookup, "HARVEST_DEMO", parse_flag)?.unwrap_or(false),
            settle_interval: parse_var(&lookup, "HARVEST_SETTLE_MS", parse_number)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_interval),
            settle_mode: parse_var(&lookup, "HARVEST_SETTLE_MODE", |s| s.parse::<SettleMode>())?
                .unwrap_or(defaults.settle_mode),
            action_timeout: parse_var(&lookup, "HARVEST_ACTION_TIMEOUT_MS", parse_number)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.action_timeout),
            extract_timeout: parse_var(&lookup, "HARVEST_EXTRACT_TIMEOUT_MS", parse_number)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.extract_timeout),
            ready_timeout: parse_var(&lookup, "HARVEST_READY_TIMEOUT_MS", parse_number)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.ready_timeout),
            full_history: parse_var(&lookup, "HARVEST_FULL_HISTORY", parse_flag)?
                .unwrap_or(false),
            detail_limit: parse_var(&lookup, "HARVEST_DETAIL_LIMIT", parse_number)?,
            own_identity: non_empty(&lookup, "HARVEST_OWN_IDENTITY"),
        };

        Ok(Self {
            webdriver_url: non_empty(&lookup, "HARVEST_WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:4444".to_string()),
            inbox_url: non_empty(&lookup, "HARVEST_INBOX_URL")
                .unwrap_or_else(|| "https://www.instagram.com/direct/inbox/".to_string()),
            output_dir: non_empty(&lookup, "HARVEST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            selectors_path: non_empty(&lookup, "HARVEST_SELECTORS").map(PathBuf::from),
            json_logs: parse_var(&lookup, "HARVEST_LOG_JSON", parse_flag)?.unwrap_or(false),
            harvest,
        })
    }

    /// Log the effective configuration. The own identity is masked.
    pub fn log_redacted(&self) {
        let h = &self.harvest;
        info!(
            webdriver_url = self.webdriver_url.as_str(),
            inbox_url = self.inbox_url.as_str(),
            output_dir = %self.output_dir.display(),
            selectors = ?self.selectors_path,
            own_identity = if h.own_identity.is_some() { "<set>" } else { "<unset>" },
            "Connection config"
        );
        info!(
            cutoff_date = ?h.cutoff_date,
            item_cap = ?h.effective_item_cap(),
            max_scrolls = h.max_scroll_iterations,
            no_progress_threshold = h.no_progress_threshold,
            demo_mode = h.demo_mode,
            settle_ms = h.settle_interval.as_millis() as u64,
            settle_mode = ?h.settle_mode,
            action_timeout_ms = h.action_timeout.as_millis() as u64,
            extract_timeout_ms = h.extract_timeout.as_millis() as u64,
            full_history = h.full_history,
            detail_limit = ?h.effective_detail_limit(),
            "Harvest config"
        );
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Option<T>> {
    match non_empty(lookup, key) {
        Some(raw) => parse(&raw)
            .map(Some)
            .map_err(|e| HarvestError::Config(format!("{key}: {e}"))),
        None => Ok(None),
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| HarvestError::Config(format!("'{raw}' is not a valid number")))
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HarvestError::Config(format!("'{raw}' is not a boolean"))),
    }
}

/// Parse a `YYYY-MM-DD` cutoff date.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HarvestError::Config(format!("'{raw}' is not a YYYY-MM-DD date")))
}
