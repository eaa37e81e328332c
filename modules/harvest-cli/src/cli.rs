use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use harvest_common::config::parse_date;
use harvest_common::{Config, SettleMode};

#[derive(Parser, Debug)]
#[command(
    name = "dm-harvest",
    about = "Harvest direct-message conversations from a logged-in web inbox"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the JSON Schema of the output records and exit
    Schema,
}

/// Flags override the matching `HARVEST_*` environment variables.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// WebDriver server URL
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Inbox page to open
    #[arg(long)]
    pub inbox_url: Option<String>,

    /// Directory for conversations.json / messages.json / messages.csv
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// JSON file overriding the default CSS selectors
    #[arg(long)]
    pub selectors: Option<PathBuf>,

    /// Stop at the first conversation last active before this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub cutoff_date: Option<NaiveDate>,

    /// Stop after this many conversations
    #[arg(long)]
    pub item_cap: Option<usize>,

    /// Upper bound on reveal attempts
    #[arg(long)]
    pub max_scrolls: Option<u32>,

    /// Consecutive passes without new conversations before stopping
    #[arg(long)]
    pub no_progress_threshold: Option<u32>,

    /// Small capped run
    #[arg(long)]
    pub demo: bool,

    /// Wait after each reveal, in milliseconds
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// fixed | stable
    #[arg(long)]
    pub settle_mode: Option<SettleMode>,

    /// Bound on each browser action, in milliseconds
    #[arg(long)]
    pub action_timeout_ms: Option<u64>,

    /// Budget for reading one opened conversation, in milliseconds
    #[arg(long)]
    pub extract_timeout_ms: Option<u64>,

    /// How long to wait for the list to first render, in milliseconds
    #[arg(long)]
    pub ready_timeout_ms: Option<u64>,

    /// Open conversations and extract their messages
    #[arg(long)]
    pub full_history: bool,

    /// Open at most this many conversations
    #[arg(long)]
    pub detail_limit: Option<usize>,

    /// Handle of the logged-in account, for sent/received classification
    #[arg(long)]
    pub own_identity: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl RunArgs {
    pub fn apply(self, config: &mut Config) {
        let h = &mut config.harvest;

        if let Some(v) = self.webdriver_url {
            config.webdriver_url = v;
        }
        if let Some(v) = self.inbox_url {
            config.inbox_url = v;
        }
        if let Some(v) = self.output_dir {
            config.output_dir = v;
        }
        if self.selectors.is_some() {
            config.selectors_path = self.selectors;
        }
        if self.json_logs {
            config.json_logs = true;
        }

        if self.cutoff_date.is_some() {
            h.cutoff_date = self.cutoff_date;
        }
        if self.item_cap.is_some() {
            h.item_count_cap = self.item_cap;
        }
        if let Some(v) = self.max_scrolls {
            h.max_scroll_iterations = v;
        }
        if let Some(v) = self.no_progress_threshold {
            h.no_progress_threshold = v;
        }
        if self.demo {
            h.demo_mode = true;
        }
        if let Some(ms) = self.settle_ms {
            h.settle_interval = Duration::from_millis(ms);
        }
        if let Some(mode) = self.settle_mode {
            h.settle_mode = mode;
        }
        if let Some(ms) = self.action_timeout_ms {
            h.action_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.extract_timeout_ms {
            h.extract_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.ready_timeout_ms {
            h.ready_timeout = Duration::from_millis(ms);
        }
        if self.full_history {
            h.full_history = true;
        }
        if self.detail_limit.is_some() {
            h.detail_limit = self.detail_limit;
        }
        if self.own_identity.is_some() {
            h.own_identity = self.own_identity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli::parse_from([
            "dm-harvest",
            "--cutoff-date",
            "2024-04-01",
            "--full-history",
            "--detail-limit",
            "7",
            "--settle-mode",
            "stable",
            "--settle-ms",
            "500",
            "--output-dir",
            "/tmp/harvest",
            "--extract-timeout-ms",
            "90000",
        ]);
        assert!(cli.command.is_none());

        let mut config = base();
        cli.run.apply(&mut config);

        assert_eq!(config.harvest.cutoff_date, NaiveDate::from_ymd_opt(2024, 4, 1));
        assert!(config.harvest.full_history);
        assert_eq!(config.harvest.detail_limit, Some(7));
        assert_eq!(config.harvest.settle_mode, SettleMode::Stable);
        assert_eq!(config.harvest.settle_interval, Duration::from_millis(500));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/harvest"));
        assert_eq!(config.harvest.extract_timeout, Duration::from_secs(90));
    }

    #[test]
    fn absent_flags_keep_environment_values() {
        let mut config = Config::from_lookup(|key| match key {
            "HARVEST_ITEM_CAP" => Some("12".into()),
            "HARVEST_FULL_HISTORY" => Some("true".into()),
            _ => None,
        })
        .unwrap();
        RunArgs::default().apply(&mut config);

        assert_eq!(config.harvest.item_count_cap, Some(12));
        assert!(config.harvest.full_history);
        assert_eq!(config.webdriver_url, "http://localhost:4444");
    }

    #[test]
    fn bad_cutoff_is_rejected_by_parser() {
        let err = Cli::try_parse_from(["dm-harvest", "--cutoff-date", "04/01/2024"]);
        assert!(err.is_err());
    }

    #[test]
    fn schema_subcommand_parses() {
        let cli = Cli::parse_from(["dm-harvest", "schema"]);
        assert!(matches!(cli.command, Some(Command::Schema)));
    }
}
