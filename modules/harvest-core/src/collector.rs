// Scroll driver. One pass per step:
//
//   SCANNING   → enumerate rendered rows, extract + admit each new one,
//                open admitted rows for full history when asked to
//   EVALUATING → termination policy over the updated state
//   REVEALING  → reveal chain, then settle
//
// DONE is reached only through the policy. `HarvestState` is moved into
// each step and handed back in the returned `Step`.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use harvest_common::{
    ConversationDetail, ConversationSummary, HarvestConfig, HarvestError, Result, Selectors,
    SettleMode,
};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::accumulator::{Admission, HarvestState};
use crate::environment::Environment;
use crate::extractor::RecordExtractor;
use crate::policy::{StopReason, TerminationPolicy};
use crate::reveal::{RevealChain, RevealOutcome};
use crate::stats::HarvestStats;

/// Interval between readiness probes while waiting for the list.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Upper bound on count checks in stable settle mode.
const MAX_STABILITY_CHECKS: u32 = 10;

pub enum Step {
    Continue(HarvestState),
    Done(HarvestState, StopReason),
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub run_id: Uuid,
    pub summaries: Vec<ConversationSummary>,
    pub details: Vec<ConversationDetail>,
    pub stop_reason: StopReason,
    pub stats: HarvestStats,
}

#[derive(Debug, Default)]
struct PassResult {
    admitted: u32,
    failed: bool,
}

pub struct Collector<E: Environment> {
    env: E,
    reveal: RevealChain<E>,
    extractor: RecordExtractor,
    policy: TerminationPolicy,
    config: HarvestConfig,
}

impl<E: Environment + 'static> Collector<E> {
    pub fn new(env: E, reveal: RevealChain<E>, selectors: Selectors, config: HarvestConfig) -> Self {
        Self {
            env,
            reveal,
            extractor: RecordExtractor::new(selectors),
            policy: TerminationPolicy::from_config(&config),
            config,
        }
    }

    /// Hand the environment back, e.g. to shut the browser session down.
    pub fn into_environment(self) -> E {
        self.env
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    /// Wait for the list, then step until the policy says stop.
    ///
    /// Only a list that never becomes ready is an error; everything that
    /// goes wrong later is logged and folded into the stats.
    pub async fn run(&mut self) -> Result<HarvestOutcome> {
        let run_id = Uuid::new_v4();
        let span = info_span!("harvest", %run_id);

        async move {
            info!(
                full_history = self.config.full_history,
                strategies = self.reveal.len(),
                "Harvest starting"
            );
            self.wait_until_ready().await?;

            let mut state = HarvestState::new();
            let stop_reason = loop {
                match self.step(state).await {
                    Step::Continue(next) => state = next,
                    Step::Done(last, reason) => {
                        state = last;
                        break reason;
                    }
                }
            };

            state.stats.groups_rejected = state.rejected_group_count() as u32;
            info!(
                conversations = state.len(),
                details = state.details().len(),
                passes = state.stats.passes,
                reason = %stop_reason,
                "Harvest finished"
            );

            let (summaries, details, stats) = state.into_parts();
            Ok(HarvestOutcome {
                run_id,
                summaries,
                details,
                stop_reason,
                stats,
            })
        }
        .instrument(span)
        .await
    }

    /// One full SCANNING → EVALUATING → REVEALING cycle.
    pub async fn step(&mut self, mut state: HarvestState) -> Step {
        state.stats.passes += 1;
        let mut pass = self.scan(&mut state).await;

        // A failed reveal surfaces here, as one failed pass.
        if std::mem::take(&mut state.reveal_failed) {
            pass.failed = true;
        }
        if pass.failed {
            state.stats.failed_passes += 1;
        }
        if pass.admitted == 0 || pass.failed {
            state.no_progress_streak += 1;
        } else {
            state.no_progress_streak = 0;
        }
        info!(
            pass = state.stats.passes,
            admitted = pass.admitted,
            total = state.len(),
            streak = state.no_progress_streak,
            "Pass complete"
        );

        if let Some(reason) = self.policy.evaluate(&state) {
            return Step::Done(state, reason);
        }

        self.reveal_more(&mut state).await;
        self.settle().await;
        Step::Continue(state)
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            match with_timeout("ready", self.config.action_timeout, self.env.is_ready()).await {
                Ok(true) => {
                    debug!("Conversation list ready");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.is_transient() => debug!(error = %e, "Readiness probe failed"),
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(HarvestError::FatalSetup(format!(
                    "conversation list did not render within {}ms",
                    self.config.ready_timeout.as_millis()
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn scan(&mut self, state: &mut HarvestState) -> PassResult {
        let mut pass = PassResult::default();

        let Some(mut items) = self.list_items(&mut pass).await else {
            return pass;
        };
        let mut seen_this_pass: HashSet<String> = HashSet::new();

        let mut index = 0;
        while index < items.len() {
            let item = items[index].clone();
            index += 1;

            if self.policy.cap_reached(state) {
                break;
            }

            let summary = match self.extractor.extract_summary(&mut self.env, &item).await {
                Ok(Some(summary)) if !seen_this_pass.insert(summary.identity.clone()) => {
                    // Shifted into view again by a re-listing.
                    continue;
                }
                Ok(Some(summary)) => {
                    state.stats.items_seen += 1;
                    summary
                }
                Ok(None) => {
                    state.stats.items_seen += 1;
                    debug!(?item, "Row has no resolvable identity");
                    state.stats.unreadable_items += 1;
                    continue;
                }
                Err(e) => {
                    state.stats.items_seen += 1;
                    warn!(?item, error = %e, "Skipping unreadable row");
                    state.stats.unreadable_items += 1;
                    continue;
                }
            };

            if state.is_processed(&summary.identity) {
                state.stats.duplicates += 1;
                continue;
            }

            state.last_seen = Some(summary.clone());
            if self.policy.crosses_cutoff(&summary) {
                info!(
                    identity = summary.identity.as_str(),
                    timestamp = ?summary.last_activity,
                    "Reached cutoff date"
                );
                break;
            }

            let identity = summary.identity.clone();
            match state.admit(summary) {
                Admission::Admitted => {
                    pass.admitted += 1;
                    state.stats.admitted += 1;
                    debug!(identity = identity.as_str(), "Admitted conversation");
                }
                Admission::GroupConversation => {
                    debug!(identity = identity.as_str(), "Skipping group conversation");
                    continue;
                }
                Admission::Duplicate => continue,
            }

            if !self.wants_detail(state) {
                continue;
            }
            if self.harvest_detail(state, &item, &identity).await {
                pass.failed = true;
            }
            // Returning to the list re-renders it and earlier handles go
            // stale. Continue at the same position in a fresh listing.
            match self.list_items(&mut pass).await {
                Some(fresh) => items = fresh,
                None => break,
            }
        }

        pass
    }

    async fn list_items(&mut self, pass: &mut PassResult) -> Option<Vec<E::Handle>> {
        match with_timeout(
            "list",
            self.config.action_timeout,
            self.env.list_visible_items(),
        )
        .await
        {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(error = %e, "Could not enumerate conversation list");
                pass.failed = true;
                None
            }
        }
    }

    fn wants_detail(&self, state: &HarvestState) -> bool {
        match self.config.effective_detail_limit() {
            Some(limit) => (state.stats.details_attempted() as usize) < limit,
            None => true,
        }
    }

    /// open → extract → close for one admitted row. Failures leave the row
    /// summary-only. Returns `true` when an action timed out, which marks
    /// the pass as failed. Extraction runs under its own, larger budget.
    async fn harvest_detail(
        &mut self,
        state: &mut HarvestState,
        item: &E::Handle,
        identity: &str,
    ) -> bool {
        let timeout = self.config.action_timeout;

        let opened = match with_timeout("open", timeout, self.env.open(item)).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(identity, error = %e, "Could not open conversation, keeping summary only");
                state.stats.details_failed += 1;
                return is_timeout(&e);
            }
        };

        let extracted = with_timeout(
            "extract",
            self.config.extract_timeout,
            self.extractor.extract_detail(
                &mut self.env,
                &opened,
                identity,
                self.config.own_identity.as_deref(),
            ),
        )
        .await;

        let mut timed_out = false;
        if let Err(e) = with_timeout("close", timeout, self.env.close()).await {
            warn!(identity, error = %e, "Could not return to conversation list");
            timed_out = is_timeout(&e);
        }

        match extracted {
            Ok(detail) => {
                info!(
                    identity,
                    messages = detail.total_message_count,
                    first = ?detail.first_date,
                    last = ?detail.last_date,
                    "Extracted history"
                );
                state.stats.details_extracted += 1;
                state.stats.messages_extracted += detail.total_message_count as u32;
                state.record_detail(detail);
            }
            Err(e) => {
                warn!(identity, error = %e, "History extraction failed, keeping summary only");
                state.stats.details_failed += 1;
                timed_out |= is_timeout(&e);
            }
        }

        timed_out
    }

    async fn reveal_more(&mut self, state: &mut HarvestState) {
        state.scroll_attempts += 1;
        state.stats.reveals += 1;

        match with_timeout(
            "reveal",
            self.config.action_timeout,
            self.reveal.reveal(&mut self.env),
        )
        .await
        {
            Ok(RevealOutcome::Revealed(strategy)) => {
                debug!(strategy = strategy.as_str(), attempt = state.scroll_attempts, "Revealed more rows");
                state.reached_end = false;
            }
            Ok(RevealOutcome::Exhausted) => {
                if !state.reached_end {
                    info!(attempt = state.scroll_attempts, "List cannot scroll further");
                }
                state.reached_end = true;
            }
            Err(e) => {
                warn!(attempt = state.scroll_attempts, error = %e, "Reveal failed");
                state.stats.reveal_failures += 1;
                state.reveal_failed = true;
            }
        }
    }

    /// Heuristic wait for lazily rendered rows. Neither mode guarantees the
    /// list has finished rendering.
    async fn settle(&mut self) {
        let interval = self.config.settle_interval;
        match self.config.settle_mode {
            SettleMode::Fixed => tokio::time::sleep(interval).await,
            SettleMode::Stable => {
                let mut previous = self.visible_count().await;
                for _ in 0..MAX_STABILITY_CHECKS {
                    tokio::time::sleep(interval).await;
                    let current = self.visible_count().await;
                    if current.is_some() && current == previous {
                        return;
                    }
                    previous = current;
                }
                debug!("Row count never stabilised, continuing");
            }
        }
    }

    async fn visible_count(&mut self) -> Option<usize> {
        with_timeout("list", self.config.action_timeout, self.env.list_visible_items())
            .await
            .ok()
            .map(|items| items.len())
    }
}

async fn with_timeout<T>(
    action: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(HarvestError::EnvironmentTimeout {
            action,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

fn is_timeout(e: &HarvestError) -> bool {
    matches!(e, HarvestError::EnvironmentTimeout { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingReveal, MockEnvironment, MockItem, MockNode, SnapshotReveal};

    fn config() -> HarvestConfig {
        HarvestConfig {
            settle_interval: Duration::ZERO,
            ready_timeout: Duration::from_millis(50),
            action_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    fn item(id: &str, ts: &str) -> MockItem {
        MockItem::new(&format!("/{id}/"), ts)
    }

    fn collector(env: MockEnvironment, config: HarvestConfig) -> Collector<MockEnvironment> {
        Collector::new(
            env,
            RevealChain::new().with(SnapshotReveal),
            Selectors::default(),
            config,
        )
    }

    #[tokio::test]
    async fn step_hands_state_back() {
        let env = MockEnvironment::single(vec![item("alice", "2024-05-01T00:00:00Z")]);
        let mut collector = collector(env, config());

        let Step::Continue(state) = collector.step(HarvestState::new()).await else {
            panic!("first pass should not stop");
        };
        assert_eq!(state.len(), 1);
        assert_eq!(state.scroll_attempts, 1);
        assert_eq!(state.no_progress_streak, 0);
        assert!(state.reached_end);
    }

    #[tokio::test]
    async fn never_ready_is_fatal() {
        let env = MockEnvironment::single(vec![item("alice", "2024-05-01T00:00:00Z")]).never_ready();
        let mut collector = collector(env, config());
        let err = collector.run().await.unwrap_err();
        assert!(matches!(err, HarvestError::FatalSetup(_)));
    }

    #[tokio::test]
    async fn becomes_ready_after_a_few_probes() {
        let env = MockEnvironment::single(vec![item("alice", "2024-05-01T00:00:00Z")]).ready_after(2);
        let mut collector = collector(
            env,
            HarvestConfig {
                ready_timeout: Duration::from_secs(5),
                ..config()
            },
        );
        let outcome = collector.run().await.unwrap();
        assert_eq!(outcome.summaries.len(), 1);
    }

    #[tokio::test]
    async fn reveal_failures_count_toward_streak() {
        let env = MockEnvironment::single(vec![item("alice", "2024-05-01T00:00:00Z")]);
        let mut collector = Collector::new(
            env,
            RevealChain::new().with(FailingReveal::transient()),
            Selectors::default(),
            config(),
        );
        let outcome = collector.run().await.unwrap();

        // pass 1 admits; every later pass is empty and follows a failed
        // reveal, and counts once
        assert_eq!(outcome.stop_reason, StopReason::NoProgress { streak: 3 });
        assert_eq!(outcome.stats.passes, 4);
        assert_eq!(outcome.stats.reveal_failures, 3);
        assert_eq!(outcome.stats.failed_passes, 3);
    }

    #[tokio::test]
    async fn slow_open_is_a_timeout_and_keeps_summary() {
        let env = MockEnvironment::single(vec![
            item("alice", "2024-05-01T00:00:00Z")
                .with_nodes(vec![MockNode::message("hi", Some("2024-05-01T00:00:00Z"))]),
        ])
        .with_open_delay(Duration::from_millis(500));
        let mut collector = collector(
            env,
            HarvestConfig {
                full_history: true,
                action_timeout: Duration::from_millis(20),
                ..config()
            },
        );

        let outcome = collector.run().await.unwrap();
        assert_eq!(outcome.summaries.len(), 1);
        assert!(outcome.details.is_empty());
        assert_eq!(outcome.stats.details_failed, 1);
        assert_eq!(outcome.stats.failed_passes, 1);
    }

    #[tokio::test]
    async fn stable_settle_mode_runs_to_completion() {
        let items = (0..6)
            .map(|i| item(&format!("user{i}"), "2024-05-01T00:00:00Z"))
            .collect();
        let env = MockEnvironment::growing(items, 2);
        let mut collector = collector(
            env,
            HarvestConfig {
                settle_mode: SettleMode::Stable,
                settle_interval: Duration::from_millis(1),
                ..config()
            },
        );
        let outcome = collector.run().await.unwrap();
        assert_eq!(outcome.summaries.len(), 6);
    }
}
