use chrono::{DateTime, NaiveDate, Utc};
use harvest_common::{ConversationSummary, HarvestConfig};

use crate::accumulator::HarvestState;

/// Why a traversal stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    ItemCap { cap: usize },
    CutoffCrossed { identity: String, timestamp: String },
    NoProgress { streak: u32 },
    ScrollCeiling { attempts: u32 },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::ItemCap { cap } => write!(f, "item cap of {cap} reached"),
            StopReason::CutoffCrossed {
                identity,
                timestamp,
            } => write!(f, "cutoff crossed at {identity} ({timestamp})"),
            StopReason::NoProgress { streak } => {
                write!(f, "{streak} consecutive passes without new items")
            }
            StopReason::ScrollCeiling { attempts } => {
                write!(f, "scroll ceiling of {attempts} reveals reached")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminationPolicy {
    item_cap: Option<usize>,
    cutoff: Option<DateTime<Utc>>,
    no_progress_threshold: u32,
    max_scroll_iterations: u32,
}

impl TerminationPolicy {
    pub fn new(
        item_cap: Option<usize>,
        cutoff_date: Option<NaiveDate>,
        no_progress_threshold: u32,
        max_scroll_iterations: u32,
    ) -> Self {
        Self {
            item_cap,
            cutoff: cutoff_date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc()),
            no_progress_threshold: no_progress_threshold.max(1),
            max_scroll_iterations,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.effective_item_cap(),
            config.cutoff_date,
            config.no_progress_threshold,
            config.max_scroll_iterations,
        )
    }

    /// Strictly older than the cutoff, judged by the item's own last-activity
    /// timestamp. Missing or unparsable timestamps never cross.
    pub fn crosses_cutoff(&self, summary: &ConversationSummary) -> bool {
        match (self.cutoff, summary.last_activity_at()) {
            (Some(cutoff), Some(ts)) => ts < cutoff,
            _ => false,
        }
    }

    pub fn cap_reached(&self, state: &HarvestState) -> bool {
        self.item_cap.is_some_and(|cap| state.len() >= cap)
    }

    /// Evaluated once per pass, after the pass's admissions.
    pub fn evaluate(&self, state: &HarvestState) -> Option<StopReason> {
        if let Some(cap) = self.item_cap {
            if state.len() >= cap {
                return Some(StopReason::ItemCap { cap });
            }
        }

        if let Some(last) = &state.last_seen {
            if self.crosses_cutoff(last) {
                return Some(StopReason::CutoffCrossed {
                    identity: last.identity.clone(),
                    timestamp: last.last_activity.clone().unwrap_or_default(),
                });
            }
        }

        if state.no_progress_streak >= self.no_progress_threshold {
            return Some(StopReason::NoProgress {
                streak: state.no_progress_streak,
            });
        }

        if state.scroll_attempts >= self.max_scroll_iterations {
            return Some(StopReason::ScrollCeiling {
                attempts: state.scroll_attempts,
            });
        }

        None
    }
}
