// Record extraction: list rows → ConversationSummary, opened conversation →
// ConversationDetail. Stateless apart from the selector table.

use harvest_common::types::{
    calendar_day, normalize_identity, parse_date_heading, parse_timestamp, ConversationDetail,
    ConversationSummary, Direction, MessageRecord, QuotedContent, UNKNOWN_DATE,
};
use harvest_common::{Result, Selectors};
use tracing::{debug, warn};

use crate::environment::Environment;

pub struct RecordExtractor {
    selectors: Selectors,
}

impl RecordExtractor {
    pub fn new(selectors: Selectors) -> Self {
        Self { selectors }
    }

    pub fn selectors(&self) -> &Selectors {
        &self.selectors
    }

    /// Pull identity and last-activity timestamp from one list row.
    ///
    /// `Ok(None)` means the row exposes no resolvable identity (placeholder
    /// rows, rows mid-render); the caller skips it.
    pub async fn extract_summary<E: Environment>(
        &self,
        env: &mut E,
        item: &E::Handle,
    ) -> Result<Option<ConversationSummary>> {
        let s = &self.selectors;

        let from_href = env
            .query_attribute(item, &s.item_link, "href")
            .await?
            .and_then(|href| identity_from_href(&href));

        let identity = match from_href {
            Some(identity) => identity,
            None => match env
                .query_text(item, &s.item_handle_text)
                .await?
                .as_deref()
                .and_then(normalize_identity)
            {
                Some(identity) => identity,
                None => return Ok(None),
            },
        };

        let last_activity = env
            .query_attribute(item, &s.item_time, "datetime")
            .await?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Some(ConversationSummary::new(identity, last_activity)))
    }

    /// Pull the full message history of an opened conversation.
    ///
    /// Rows are read in document order. Date separator rows update the
    /// running date; message rows without a timestamp of their own inherit
    /// it. Unreadable message rows are dropped individually.
    pub async fn extract_detail<E: Environment>(
        &self,
        env: &mut E,
        opened: &E::Handle,
        identity: &str,
        self_identity: Option<&str>,
    ) -> Result<ConversationDetail> {
        let s = &self.selectors;
        let rows = env.query_all(opened, &s.timeline_row).await?;

        let mut current_date: Option<String> = None;
        let mut messages = Vec::with_capacity(rows.len());

        for row in &rows {
            if let Some(heading) = env.query_text(row, &s.date_heading).await? {
                match parse_date_heading(&heading) {
                    Some(day) => current_date = Some(day.format("%Y-%m-%d").to_string()),
                    None => debug!(identity, heading = heading.as_str(), "Unrecognised date heading"),
                }
                continue;
            }

            match self
                .extract_message(env, row, self_identity, &mut current_date)
                .await
            {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    warn!(identity, error = %e, "Skipping unreadable message row");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(identity, rows = rows.len(), messages = messages.len(), "Extracted conversation");
        Ok(ConversationDetail::assemble(identity, messages))
    }

    async fn extract_message<E: Environment>(
        &self,
        env: &mut E,
        row: &E::Handle,
        self_identity: Option<&str>,
        current_date: &mut Option<String>,
    ) -> Result<Option<MessageRecord>> {
        let s = &self.selectors;

        let text = env.query_text(row, &s.message_text).await?;
        let quoted_content = self.extract_quote(env, row).await;
        let Some(text) = text.or_else(|| quoted_content.as_ref().map(|_| String::new())) else {
            return Ok(None);
        };

        let timestamp = env
            .query_attribute(row, &s.message_time, "datetime")
            .await?
            .filter(|t| !t.trim().is_empty());

        let date = match timestamp.as_deref().and_then(parse_timestamp) {
            Some(ts) => {
                let day = calendar_day(&ts);
                *current_date = Some(day.clone());
                day
            }
            None => current_date
                .clone()
                .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
        };

        let direction = self.classify_direction(env, row, self_identity).await;

        Ok(Some(MessageRecord {
            text: text.trim().to_string(),
            timestamp,
            direction,
            date,
            quoted_content,
        }))
    }

    /// Best-effort: an own-bubble marker inside the row, or a sender link
    /// pointing at the account owner. Anything else, including query
    /// failures, is `Received`.
    async fn classify_direction<E: Environment>(
        &self,
        env: &mut E,
        row: &E::Handle,
        self_identity: Option<&str>,
    ) -> Direction {
        let s = &self.selectors;

        if let Ok(markers) = env.query_all(row, &s.own_marker).await {
            if !markers.is_empty() {
                return Direction::Sent;
            }
        }

        if let Some(me) = self_identity.and_then(normalize_identity) {
            if let Ok(Some(href)) = env.query_attribute(row, &s.sender_link, "href").await {
                if identity_from_href(&href).as_deref() == Some(me.as_str()) {
                    return Direction::Sent;
                }
            }
        }

        Direction::Received
    }

    /// At most one quoted block per message. Missing or unreadable quotes
    /// are `None`.
    async fn extract_quote<E: Environment>(
        &self,
        env: &mut E,
        row: &E::Handle,
    ) -> Option<QuotedContent> {
        let s = &self.selectors;

        let text = env
            .query_text(row, &s.quote_text)
            .await
            .ok()
            .flatten()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())?;

        let attributed_user = env
            .query_text(row, &s.quote_author)
            .await
            .ok()
            .flatten()
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        Some(QuotedContent {
            text,
            attributed_user,
        })
    }
}

/// Identity from a profile href: absolute or relative, query and fragment
/// ignored. Multi-segment paths come back intact so the accumulator can
/// reject them as group threads.
pub fn identity_from_href(href: &str) -> Option<String> {
    let href = href.trim();
    let path = match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    normalize_identity(&path)
}
