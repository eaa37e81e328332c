use std::collections::HashSet;

use harvest_common::{ConversationDetail, ConversationSummary};

use crate::stats::HarvestStats;

/// Result of offering a candidate to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
    GroupConversation,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }
}

/// Everything one harvest run knows. Created at start, threaded through
/// every collector step, consumed when the run ends.
///
/// Accumulation is append-only: summaries and details are never modified
/// or removed once recorded.
#[derive(Debug, Default)]
pub struct HarvestState {
    accumulated: Vec<ConversationSummary>,
    processed: HashSet<String>,
    details: Vec<ConversationDetail>,
    detailed: HashSet<String>,
    rejected_groups: HashSet<String>,
    /// Newest candidate considered for admission; the cutoff check reads it.
    pub last_seen: Option<ConversationSummary>,
    pub scroll_attempts: u32,
    pub no_progress_streak: u32,
    /// The last reveal failed; the next pass counts as a failed pass.
    pub reveal_failed: bool,
    pub reached_end: bool,
    pub stats: HarvestStats,
}

impl HarvestState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a candidate. Idempotent: re-offering an admitted identity is a
    /// no-op that reports `Duplicate`.
    ///
    /// Panics on an empty identity; the extractor filters those out.
    pub fn admit(&mut self, candidate: ConversationSummary) -> Admission {
        assert!(
            !candidate.identity.trim().is_empty(),
            "empty identity reached the accumulator"
        );
        if candidate.is_group() {
            self.rejected_groups.insert(candidate.identity);
            return Admission::GroupConversation;
        }
        if self.processed.contains(&candidate.identity) {
            return Admission::Duplicate;
        }

        self.processed.insert(candidate.identity.clone());
        self.accumulated.push(candidate);
        assert_eq!(
            self.accumulated.len(),
            self.processed.len(),
            "accumulator admitted a duplicate identity"
        );
        Admission::Admitted
    }

    /// Contract form of [`admit`](Self::admit): `true` only when newly added.
    /// `None` stands for a row with no resolvable identity.
    pub fn offer(&mut self, candidate: Option<ConversationSummary>) -> bool {
        match candidate {
            Some(candidate) => self.admit(candidate).is_admitted(),
            None => false,
        }
    }

    /// Attach the full history of an admitted conversation.
    ///
    /// Panics if the identity was never admitted or already has a detail;
    /// either means the collector lost track of what it opened.
    pub fn record_detail(&mut self, detail: ConversationDetail) {
        assert!(
            self.processed.contains(&detail.identity),
            "detail recorded for unadmitted identity {}",
            detail.identity
        );
        assert!(
            self.detailed.insert(detail.identity.clone()),
            "detail recorded twice for {}",
            detail.identity
        );
        self.details.push(detail);
    }

    pub fn is_processed(&self, identity: &str) -> bool {
        self.processed.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.accumulated
    }

    pub fn details(&self) -> &[ConversationDetail] {
        &self.details
    }

    pub fn rejected_group_count(&self) -> usize {
        self.rejected_groups.len()
    }

    pub fn into_parts(self) -> (Vec<ConversationSummary>, Vec<ConversationDetail>, HarvestStats) {
        (self.accumulated, self.details, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(identity: &str, ts: Option<&str>) -> ConversationSummary {
        ConversationSummary::new(identity, ts.map(String::from))
    }

    #[test]
    fn admits_new_identity() {
        let mut state = HarvestState::new();
        assert_eq!(state.admit(summary("alice", None)), Admission::Admitted);
        assert!(state.is_processed("alice"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn readmitting_is_a_noop() {
        let mut state = HarvestState::new();
        assert!(state.offer(Some(summary("alice", Some("2024-05-01T00:00:00Z")))));
        assert!(!state.offer(Some(summary("alice", Some("2024-05-02T00:00:00Z")))));
        assert_eq!(state.admit(summary("alice", None)), Admission::Duplicate);
        assert_eq!(state.len(), 1);
        assert_eq!(
            state.summaries()[0].last_activity.as_deref(),
            Some("2024-05-01T00:00:00Z")
        );
    }

    #[test]
    fn group_identity_rejected_regardless_of_timestamp() {
        let mut state = HarvestState::new();
        assert_eq!(
            state.admit(summary("group/123", Some("2024-05-01T00:00:00Z"))),
            Admission::GroupConversation
        );
        assert_eq!(
            state.admit(summary("group/123", Some("not a date"))),
            Admission::GroupConversation
        );
        assert_eq!(state.admit(summary("group/123", None)), Admission::GroupConversation);
        assert!(state.is_empty());
        assert!(!state.is_processed("group/123"));
        assert_eq!(state.rejected_group_count(), 1);
    }

    #[test]
    fn unresolvable_row_is_not_admitted() {
        let mut state = HarvestState::new();
        assert!(!state.offer(None));
        assert!(state.is_empty());
    }

    #[test]
    #[should_panic(expected = "empty identity")]
    fn empty_identity_panics() {
        let mut state = HarvestState::new();
        state.admit(summary("  ", None));
    }

    #[test]
    fn identities_stay_distinct_across_repeated_offers() {
        let mut state = HarvestState::new();
        let passes = [
            vec!["a", "b", "c"],
            vec!["b", "c", "d"],
            vec!["c", "d", "e", "a"],
        ];
        for pass in passes {
            for id in pass {
                state.admit(summary(id, None));
            }
        }

        let ids: Vec<&str> = state.summaries().iter().map(|s| s.identity.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        let distinct: HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), ids.len());
    }

    #[test]
    fn records_detail_for_admitted_identity() {
        let mut state = HarvestState::new();
        state.admit(summary("alice", None));
        state.record_detail(ConversationDetail::assemble("alice", Vec::new()));
        assert_eq!(state.details().len(), 1);
    }

    #[test]
    #[should_panic(expected = "unadmitted")]
    fn detail_for_unknown_identity_panics() {
        let mut state = HarvestState::new();
        state.record_detail(ConversationDetail::assemble("ghost", Vec::new()));
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn duplicate_detail_panics() {
        let mut state = HarvestState::new();
        state.admit(summary("alice", None));
        state.record_detail(ConversationDetail::assemble("alice", Vec::new()));
        state.record_detail(ConversationDetail::assemble("alice", Vec::new()));
    }
}
