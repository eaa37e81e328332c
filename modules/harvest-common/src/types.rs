use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Bucket key for messages whose calendar day could not be resolved.
pub const UNKNOWN_DATE: &str = "unknown";

// --- Timestamps ---

/// Parse an ISO-8601 timestamp as rendered in `datetime` attributes.
/// Offsets are normalised to UTC; a timestamp without an offset is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Calendar day (`YYYY-MM-DD`, UTC) of a timestamp.
pub fn calendar_day(ts: &DateTime<Utc>) -> String {
    ts.date_naive().format("%Y-%m-%d").to_string()
}

const HEADING_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%A, %B %d, %Y",
    "%a, %b %d, %Y",
    "%d %B %Y",
    "%m/%d/%Y",
];

/// Parse a date separator heading ("May 1, 2024", "2024-05-01", ...).
/// Relative headings such as "Today" or "Yesterday" yield `None`.
pub fn parse_date_heading(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    // Headings often append a time: "May 1, 2024, 3:14 PM".
    let candidates = [text, text.rsplit_once(',').map(|(head, _)| head).unwrap_or(text)];
    candidates.iter().find_map(|candidate| {
        HEADING_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(candidate.trim(), fmt).ok())
    })
}

// --- Conversation list ---

/// One entry of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Normalised handle of the counterpart. Dedup key.
    pub identity: String,
    #[serde(rename = "lastActivityTimestamp")]
    pub last_activity: Option<String>,
}

impl ConversationSummary {
    pub fn new(identity: impl Into<String>, last_activity: Option<String>) -> Self {
        Self {
            identity: identity.into(),
            last_activity,
        }
    }

    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity.as_deref().and_then(parse_timestamp)
    }

    /// Group threads surface with a multi-segment path as their identity.
    pub fn is_group(&self) -> bool {
        self.identity.contains('/')
    }
}

/// Normalise a raw handle or profile href into an identity.
/// Returns `None` when nothing usable remains.
pub fn normalize_identity(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('/').trim_start_matches('@').trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

// --- Messages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Sent,
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sent => write!(f, "sent"),
            Direction::Received => write!(f, "received"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotedContent {
    pub text: String,
    pub attributed_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub text: String,
    pub timestamp: Option<String>,
    pub direction: Direction,
    /// Calendar day, either from the message's own timestamp or carried
    /// forward from the last date heading.
    pub date: String,
    pub quoted_content: Option<QuotedContent>,
}

impl MessageRecord {
    pub fn timestamp_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

// --- Conversation detail ---

/// Full history of one conversation, partitioned by calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub identity: String,
    pub messages_by_date: BTreeMap<String, Vec<MessageRecord>>,
    pub total_message_count: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

impl ConversationDetail {
    /// Build a detail from messages in document order.
    ///
    /// Messages are stably sorted by timestamp. A message without a parsable
    /// timestamp sorts as if it carried the timestamp of the closest earlier
    /// message that has one, so it stays next to its neighbours. Equal
    /// timestamps keep document order.
    pub fn assemble(identity: impl Into<String>, messages: Vec<MessageRecord>) -> Self {
        let mut carried: Option<DateTime<Utc>> = None;
        let mut keyed: Vec<(Option<DateTime<Utc>>, MessageRecord)> = messages
            .into_iter()
            .map(|m| {
                if let Some(ts) = m.timestamp_at() {
                    carried = Some(ts);
                }
                (carried, m)
            })
            .collect();
        keyed.sort_by_key(|(ts, _)| *ts);

        let total_message_count = keyed.len();
        let mut messages_by_date: BTreeMap<String, Vec<MessageRecord>> = BTreeMap::new();
        for (_, message) in keyed {
            messages_by_date
                .entry(message.date.clone())
                .or_default()
                .push(message);
        }

        let mut dated = messages_by_date
            .keys()
            .filter(|k| k.as_str() != UNKNOWN_DATE);
        let first_date = dated.next().cloned();
        let last_date = dated.next_back().cloned().or_else(|| first_date.clone());

        Self {
            identity: identity.into(),
            messages_by_date,
            total_message_count,
            first_date,
            last_date,
        }
    }

    /// All messages, day by day, in chronological order.
    pub fn messages(&self) -> impl Iterator<Item = (&str, &MessageRecord)> {
        self.messages_by_date
            .iter()
            .flat_map(|(date, msgs)| msgs.iter().map(move |m| (date.as_str(), m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str, ts: Option<&str>, date: &str) -> MessageRecord {
        MessageRecord {
            text: text.to_string(),
            timestamp: ts.map(String::from),
            direction: Direction::Received,
            date: date.to_string(),
            quoted_content: None,
        }
    }

    #[test]
    fn parses_rfc3339_and_naive_timestamps() {
        let a = parse_timestamp("2024-05-01T10:00:00.000Z").unwrap();
        let b = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        let c = parse_timestamp("2024-05-01T10:00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(calendar_day(&a), "2024-05-01");
    }

    #[test]
    fn garbage_timestamp_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("3 hours ago").is_none());
    }

    #[test]
    fn parses_common_heading_shapes() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(parse_date_heading("May 1, 2024"), Some(day));
        assert_eq!(parse_date_heading(" 2024-05-01 "), Some(day));
        assert_eq!(parse_date_heading("Wednesday, May 1, 2024"), Some(day));
        assert_eq!(parse_date_heading("May 1, 2024, 3:14 PM"), Some(day));
        assert_eq!(parse_date_heading("Today"), None);
    }

    #[test]
    fn normalizes_handles() {
        assert_eq!(normalize_identity("/Alice/"), Some("alice".to_string()));
        assert_eq!(normalize_identity("  @bob "), Some("bob".to_string()));
        assert_eq!(
            normalize_identity("/group/123/"),
            Some("group/123".to_string())
        );
        assert_eq!(normalize_identity(" / "), None);
    }

    #[test]
    fn group_identity_detected() {
        assert!(ConversationSummary::new("group/123", None).is_group());
        assert!(!ConversationSummary::new("alice", None).is_group());
    }

    #[test]
    fn assemble_sorts_and_partitions_by_day() {
        let detail = ConversationDetail::assemble(
            "alice",
            vec![
                msg("late", Some("2024-05-02T09:00:00Z"), "2024-05-02"),
                msg("early", Some("2024-05-01T09:00:00Z"), "2024-05-01"),
                msg("middle", Some("2024-05-01T18:00:00Z"), "2024-05-01"),
            ],
        );

        assert_eq!(detail.total_message_count, 3);
        assert_eq!(detail.first_date.as_deref(), Some("2024-05-01"));
        assert_eq!(detail.last_date.as_deref(), Some("2024-05-02"));
        let texts: Vec<&str> = detail.messages().map(|(_, m)| m.text.as_str()).collect();
        assert_eq!(texts, vec!["early", "middle", "late"]);
    }

    #[test]
    fn equal_timestamps_keep_document_order() {
        let ts = Some("2024-05-01T09:00:00Z");
        let detail = ConversationDetail::assemble(
            "alice",
            vec![
                msg("first", ts, "2024-05-01"),
                msg("second", ts, "2024-05-01"),
                msg("third", ts, "2024-05-01"),
            ],
        );
        let texts: Vec<&str> = detail.messages().map(|(_, m)| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn untimed_message_stays_after_its_predecessor() {
        let detail = ConversationDetail::assemble(
            "alice",
            vec![
                msg("b", Some("2024-05-01T10:00:00Z"), "2024-05-01"),
                msg("b-reply", None, "2024-05-01"),
                msg("a", Some("2024-05-01T08:00:00Z"), "2024-05-01"),
            ],
        );
        let texts: Vec<&str> = detail.messages().map(|(_, m)| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "b-reply"]);
    }

    #[test]
    fn single_day_sets_both_bounds() {
        let detail = ConversationDetail::assemble(
            "alice",
            vec![msg("only", Some("2024-05-01T10:00:00Z"), "2024-05-01")],
        );
        assert_eq!(detail.first_date, detail.last_date);
    }

    #[test]
    fn unknown_bucket_excluded_from_bounds() {
        let detail = ConversationDetail::assemble(
            "alice",
            vec![
                msg("lost", None, UNKNOWN_DATE),
                msg("found", Some("2024-05-01T10:00:00Z"), "2024-05-01"),
            ],
        );
        assert_eq!(detail.messages_by_date.len(), 2);
        assert_eq!(detail.first_date.as_deref(), Some("2024-05-01"));
        assert_eq!(detail.last_date.as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn empty_detail_has_no_bounds() {
        let detail = ConversationDetail::assemble("alice", Vec::new());
        assert_eq!(detail.total_message_count, 0);
        assert!(detail.first_date.is_none());
        assert!(detail.last_date.is_none());
    }

    #[test]
    fn summary_serializes_with_wire_names() {
        let summary = ConversationSummary::new("alice", Some("2024-05-01T00:00:00Z".into()));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["identity"], "alice");
        assert_eq!(json["lastActivityTimestamp"], "2024-05-01T00:00:00Z");
    }
}
