use async_trait::async_trait;
use harvest_common::{HarvestError, Result};
use tracing::{debug, warn};

use crate::environment::Environment;

/// One way of making the list render more rows: scrolling a container,
/// scrolling the last row into view, pressing End, clicking "load more".
#[async_trait]
pub trait RevealStrategy<E: Environment>: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(true)` when the viewport moved, `Ok(false)` when this strategy
    /// had nothing left to scroll.
    async fn reveal(&self, env: &mut E) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// A strategy moved the viewport.
    Revealed(String),
    /// Every strategy ran cleanly and none could move further.
    Exhausted,
}

/// Strategies tried in order until one reports success.
pub struct RevealChain<E: Environment> {
    strategies: Vec<Box<dyn RevealStrategy<E>>>,
}

impl<E: Environment + 'static> RevealChain<E> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with(mut self, strategy: impl RevealStrategy<E> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run strategies in order. Transient failures fall through to the next
    /// strategy; if nothing succeeded and at least one failed, the last
    /// failure is returned.
    pub async fn reveal(&self, env: &mut E) -> Result<RevealOutcome> {
        let mut last_error: Option<HarvestError> = None;

        for strategy in &self.strategies {
            match strategy.reveal(env).await {
                Ok(true) => {
                    debug!(strategy = strategy.name(), "Reveal succeeded");
                    return Ok(RevealOutcome::Revealed(strategy.name().to_string()));
                }
                Ok(false) => {
                    debug!(strategy = strategy.name(), "Reveal strategy made no progress");
                }
                Err(e) if e.is_transient() => {
                    warn!(strategy = strategy.name(), error = %e, "Reveal strategy failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(RevealOutcome::Exhausted),
        }
    }
}

impl<E: Environment + 'static> Default for RevealChain<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingReveal, MockEnvironment, MockItem, NoopReveal, SnapshotReveal};

    fn env() -> MockEnvironment {
        MockEnvironment::growing(
            vec![
                MockItem::new("alice", "2024-05-01T00:00:00Z"),
                MockItem::new("bob", "2024-04-30T00:00:00Z"),
            ],
            1,
        )
    }

    #[tokio::test]
    async fn first_successful_strategy_wins() {
        let mut env = env();
        let chain = RevealChain::new()
            .with(NoopReveal)
            .with(SnapshotReveal)
            .with(FailingReveal::transient());

        let outcome = chain.reveal(&mut env).await.unwrap();
        assert_eq!(outcome, RevealOutcome::Revealed("snapshot".to_string()));
        assert_eq!(env.snapshot_index(), 1);
    }

    #[tokio::test]
    async fn transient_failure_falls_through() {
        let mut env = env();
        let chain = RevealChain::new()
            .with(FailingReveal::transient())
            .with(SnapshotReveal);

        let outcome = chain.reveal(&mut env).await.unwrap();
        assert_eq!(outcome, RevealOutcome::Revealed("snapshot".to_string()));
    }

    #[tokio::test]
    async fn all_idle_is_exhausted() {
        let mut env = env();
        let chain = RevealChain::new().with(NoopReveal).with(NoopReveal);
        assert_eq!(chain.reveal(&mut env).await.unwrap(), RevealOutcome::Exhausted);
    }

    #[tokio::test]
    async fn failure_without_success_is_reported() {
        let mut env = env();
        let chain = RevealChain::new()
            .with(FailingReveal::transient())
            .with(NoopReveal);
        assert!(chain.reveal(&mut env).await.is_err());
    }

    #[tokio::test]
    async fn fatal_failure_stops_the_chain() {
        let mut env = env();
        let chain = RevealChain::new()
            .with(FailingReveal::fatal())
            .with(SnapshotReveal);
        assert!(chain.reveal(&mut env).await.is_err());
        assert_eq!(env.snapshot_index(), 0);
    }
}
