// Test mocks for the harvest loop.
//
// - MockEnvironment (Environment): scripted list snapshots over a fixed
//   set of conversations, selectors resolved against `Selectors::default()`
// - SnapshotReveal / NoopReveal / FailingReveal / FlakyReveal / SlowReveal
//   (RevealStrategy)
//
// No browser, no network: `cargo test` in seconds.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use harvest_common::{HarvestError, Result, Selectors};

use crate::environment::Environment;
use crate::reveal::RevealStrategy;

// ---------------------------------------------------------------------------
// Scripted DOM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum NodeKind {
    Heading(String),
    Message {
        text: String,
        timestamp: Option<String>,
        sent: bool,
        sender: Option<String>,
        quote: Option<(String, String)>,
    },
    Broken,
    Empty,
}

/// One row of an opened conversation.
#[derive(Debug, Clone)]
pub struct MockNode {
    kind: NodeKind,
}

impl MockNode {
    pub fn heading(text: &str) -> Self {
        Self {
            kind: NodeKind::Heading(text.to_string()),
        }
    }

    pub fn message(text: &str, timestamp: Option<&str>) -> Self {
        Self {
            kind: NodeKind::Message {
                text: text.to_string(),
                timestamp: timestamp.map(String::from),
                sent: false,
                sender: None,
                quote: None,
            },
        }
    }

    /// Row whose text query fails.
    pub fn broken() -> Self {
        Self {
            kind: NodeKind::Broken,
        }
    }

    /// Row with neither heading nor text (media, system notices).
    pub fn empty() -> Self {
        Self {
            kind: NodeKind::Empty,
        }
    }

    pub fn sent(mut self) -> Self {
        if let NodeKind::Message { sent, .. } = &mut self.kind {
            *sent = true;
        }
        self
    }

    pub fn from_sender(mut self, href: &str) -> Self {
        if let NodeKind::Message { sender, .. } = &mut self.kind {
            *sender = Some(href.to_string());
        }
        self
    }

    pub fn quoting(mut self, text: &str, user: &str) -> Self {
        if let NodeKind::Message { quote, .. } = &mut self.kind {
            *quote = Some((text.to_string(), user.to_string()));
        }
        self
    }
}

/// One conversation row in the list.
#[derive(Debug, Clone)]
pub struct MockItem {
    href: Option<String>,
    handle_text: Option<String>,
    timestamp: Option<String>,
    nodes: Vec<MockNode>,
    fail_open: bool,
}

impl MockItem {
    /// Empty strings mean "attribute absent".
    pub fn new(href: &str, timestamp: &str) -> Self {
        Self {
            href: Some(href.to_string()).filter(|h| !h.is_empty()),
            handle_text: None,
            timestamp: Some(timestamp.to_string()).filter(|t| !t.is_empty()),
            nodes: Vec::new(),
            fail_open: false,
        }
    }

    pub fn with_handle_text(mut self, text: &str) -> Self {
        self.handle_text = Some(text.to_string());
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<MockNode>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockHandle {
    /// Item index and the list generation the handle was issued in.
    Item(usize, u32),
    Detail(usize),
    Row(usize, usize),
}

// ---------------------------------------------------------------------------
// MockEnvironment
// ---------------------------------------------------------------------------

/// Virtualized list over a fixed set of items. Each snapshot lists the item
/// indices rendered at that scroll position; `advance` moves to the next.
pub struct MockEnvironment {
    items: Vec<MockItem>,
    snapshots: Vec<Vec<usize>>,
    current: usize,
    selectors: Selectors,
    open: Option<usize>,
    ready_after: Option<u32>,
    probes: u32,
    open_delay: Option<Duration>,
    query_delay: Option<Duration>,
    invalidate_on_close: bool,
    generation: u32,
    opens: u32,
    list_calls: u32,
}

impl MockEnvironment {
    pub fn from_snapshots(items: Vec<MockItem>, snapshots: Vec<Vec<usize>>) -> Self {
        Self {
            items,
            snapshots,
            current: 0,
            selectors: Selectors::default(),
            open: None,
            ready_after: Some(0),
            probes: 0,
            open_delay: None,
            query_delay: None,
            invalidate_on_close: false,
            generation: 0,
            opens: 0,
            list_calls: 0,
        }
    }

    /// Every item visible at once; revealing does nothing.
    pub fn single(items: Vec<MockItem>) -> Self {
        let all = (0..items.len()).collect();
        Self::from_snapshots(items, vec![all])
    }

    /// Snapshot N shows the first `k * (N + 1)` items.
    pub fn growing(items: Vec<MockItem>, k: usize) -> Self {
        let k = k.max(1);
        let total = items.len();
        let count = total.div_ceil(k).max(1);
        let snapshots = (0..count)
            .map(|n| (0..((n + 1) * k).min(total)).collect())
            .collect();
        Self::from_snapshots(items, snapshots)
    }

    /// A sliding window of `window` rows that moves `step` rows per reveal,
    /// like a virtualized list that unmounts rows scrolled out of view.
    pub fn windowed(items: Vec<MockItem>, window: usize, step: usize) -> Self {
        let total = items.len();
        let step = step.max(1);
        let mut snapshots = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + window).min(total);
            snapshots.push((start..end).collect());
            if end >= total {
                break;
            }
            start += step;
        }
        Self::from_snapshots(items, snapshots)
    }

    pub fn never_ready(mut self) -> Self {
        self.ready_after = None;
        self
    }

    /// Report not-ready for the first `probes` readiness checks.
    pub fn ready_after(mut self, probes: u32) -> Self {
        self.ready_after = Some(probes);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Delay on every query inside an opened conversation.
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// Closing a conversation re-renders the list, so row handles issued
    /// before the close go stale.
    pub fn invalidating_on_close(mut self) -> Self {
        self.invalidate_on_close = true;
        self
    }

    /// Move to the next snapshot. `false` at the last one.
    pub fn advance(&mut self) -> bool {
        if self.current + 1 < self.snapshots.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    pub fn snapshot_index(&self) -> usize {
        self.current
    }

    pub fn opens(&self) -> u32 {
        self.opens
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn node(&self, item: usize, row: usize) -> Result<&NodeKind> {
        self.items
            .get(item)
            .and_then(|i| i.nodes.get(row))
            .map(|n| &n.kind)
            .ok_or_else(|| HarvestError::Environment(format!("stale row {item}/{row}")))
    }

    fn item(&self, index: usize) -> Result<&MockItem> {
        self.items
            .get(index)
            .ok_or_else(|| HarvestError::Environment(format!("stale item {index}")))
    }

    fn live_item(&self, index: usize, generation: u32) -> Result<&MockItem> {
        if generation != self.generation {
            return Err(HarvestError::TransientExtraction(format!(
                "item {index} is no longer attached to the list"
            )));
        }
        self.item(index)
    }

    async fn query_pause(&self) {
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Environment for MockEnvironment {
    type Handle = MockHandle;

    async fn is_ready(&mut self) -> Result<bool> {
        self.probes += 1;
        Ok(self.ready_after.is_some_and(|n| self.probes > n))
    }

    async fn list_visible_items(&mut self) -> Result<Vec<MockHandle>> {
        self.list_calls += 1;
        if self.open.is_some() {
            return Err(HarvestError::Environment(
                "conversation list hidden while a conversation is open".into(),
            ));
        }
        Ok(self
            .snapshots
            .get(self.current)
            .map(|snapshot| {
                snapshot
                    .iter()
                    .map(|&i| MockHandle::Item(i, self.generation))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn open(&mut self, item: &MockHandle) -> Result<MockHandle> {
        let MockHandle::Item(index, generation) = *item else {
            return Err(HarvestError::Environment(format!("cannot open {item:?}")));
        };
        if let Some(already) = self.open {
            panic!("opened item {index} while item {already} is still open");
        }
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.live_item(index, generation)?.fail_open {
            return Err(HarvestError::Environment("click intercepted".into()));
        }
        self.open = Some(index);
        self.opens += 1;
        Ok(MockHandle::Detail(index))
    }

    async fn close(&mut self) -> Result<()> {
        match self.open.take() {
            Some(_) => {
                if self.invalidate_on_close {
                    self.generation += 1;
                }
                Ok(())
            }
            None => Err(HarvestError::Environment("nothing is open".into())),
        }
    }

    async fn query_all(&mut self, handle: &MockHandle, selector: &str) -> Result<Vec<MockHandle>> {
        match handle {
            MockHandle::Detail(i) if selector == self.selectors.timeline_row => {
                self.query_pause().await;
                if self.open != Some(*i) {
                    return Err(HarvestError::Environment(format!("detail {i} is not open")));
                }
                Ok((0..self.item(*i)?.nodes.len())
                    .map(|row| MockHandle::Row(*i, row))
                    .collect())
            }
            MockHandle::Row(i, row) if selector == self.selectors.own_marker => {
                self.query_pause().await;
                match self.node(*i, *row)? {
                    NodeKind::Message { sent: true, .. } => Ok(vec![handle.clone()]),
                    _ => Ok(Vec::new()),
                }
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn query_text(&mut self, handle: &MockHandle, selector: &str) -> Result<Option<String>> {
        if matches!(handle, MockHandle::Row(..)) {
            self.query_pause().await;
        }
        let s = &self.selectors;
        match handle {
            MockHandle::Item(i, generation) if selector == s.item_handle_text => {
                Ok(self.live_item(*i, *generation)?.handle_text.clone())
            }
            MockHandle::Row(i, row) => {
                let node = self.node(*i, *row)?;
                let text = if selector == s.date_heading {
                    match node {
                        NodeKind::Heading(text) => Some(text.clone()),
                        _ => None,
                    }
                } else if selector == s.message_text {
                    match node {
                        NodeKind::Message { text, .. } => Some(text.clone()),
                        NodeKind::Broken => {
                            return Err(HarvestError::TransientExtraction(format!(
                                "row {i}/{row} detached"
                            )))
                        }
                        _ => None,
                    }
                } else if selector == s.quote_text || selector == s.quote_author {
                    match node {
                        NodeKind::Message {
                            quote: Some((text, user)),
                            ..
                        } => Some(if selector == s.quote_text {
                            text.clone()
                        } else {
                            user.clone()
                        }),
                        _ => None,
                    }
                } else {
                    None
                };
                Ok(text)
            }
            _ => Ok(None),
        }
    }

    async fn query_attribute(
        &mut self,
        handle: &MockHandle,
        selector: &str,
        attr: &str,
    ) -> Result<Option<String>> {
        if matches!(handle, MockHandle::Row(..)) {
            self.query_pause().await;
        }
        let s = &self.selectors;
        match handle {
            MockHandle::Item(i, generation) => {
                let item = self.live_item(*i, *generation)?;
                if selector == s.item_link && attr == "href" {
                    Ok(item.href.clone())
                } else if selector == s.item_time && attr == "datetime" {
                    Ok(item.timestamp.clone())
                } else {
                    Ok(None)
                }
            }
            MockHandle::Row(i, row) => match self.node(*i, *row)? {
                NodeKind::Message {
                    timestamp, sender, ..
                } => {
                    if selector == s.message_time && attr == "datetime" {
                        Ok(timestamp.clone())
                    } else if selector == s.sender_link && attr == "href" {
                        Ok(sender.clone())
                    } else {
                        Ok(None)
                    }
                }
                _ => Ok(None),
            },
            MockHandle::Detail(_) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Reveal strategies
// ---------------------------------------------------------------------------

/// Advances the mock to its next snapshot.
pub struct SnapshotReveal;

#[async_trait]
impl RevealStrategy<MockEnvironment> for SnapshotReveal {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn reveal(&self, env: &mut MockEnvironment) -> Result<bool> {
        Ok(env.advance())
    }
}

/// Never moves anything.
pub struct NoopReveal;

#[async_trait]
impl RevealStrategy<MockEnvironment> for NoopReveal {
    fn name(&self) -> &str {
        "noop"
    }

    async fn reveal(&self, _env: &mut MockEnvironment) -> Result<bool> {
        Ok(false)
    }
}

/// Always errors; transient or fatal.
pub struct FailingReveal {
    fatal: bool,
}

impl FailingReveal {
    pub fn transient() -> Self {
        Self { fatal: false }
    }

    pub fn fatal() -> Self {
        Self { fatal: true }
    }
}

#[async_trait]
impl RevealStrategy<MockEnvironment> for FailingReveal {
    fn name(&self) -> &str {
        "failing"
    }

    async fn reveal(&self, _env: &mut MockEnvironment) -> Result<bool> {
        if self.fatal {
            Err(HarvestError::Other(anyhow!("browser session lost")))
        } else {
            Err(HarvestError::Environment("scroll target detached".into()))
        }
    }
}

/// Times out for the first `failures` calls, then advances like
/// `SnapshotReveal`.
pub struct FlakyReveal {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyReveal {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RevealStrategy<MockEnvironment> for FlakyReveal {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn reveal(&self, env: &mut MockEnvironment) -> Result<bool> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(HarvestError::EnvironmentTimeout {
                action: "reveal",
                timeout_ms: 200,
            });
        }
        Ok(env.advance())
    }
}

/// Advances after a delay, to exercise reveal timeouts.
pub struct SlowReveal(pub Duration);

#[async_trait]
impl RevealStrategy<MockEnvironment> for SlowReveal {
    fn name(&self) -> &str {
        "slow"
    }

    async fn reveal(&self, env: &mut MockEnvironment) -> Result<bool> {
        tokio::time::sleep(self.0).await;
        Ok(env.advance())
    }
}
