// Flat (one row per message) and hierarchical (one object per conversation)
// views of the harvested details. Pure; writing files is the caller's job.

use harvest_common::{ConversationDetail, MessageRecord};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const CSV_HEADER: &str = "Profile ID,Date,Timestamp,Message,Sender,Quoted Text,Quoted User";

/// One message flattened with its parent conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatRow {
    pub profile_id: String,
    pub date: String,
    pub timestamp: String,
    pub message: String,
    pub sender: String,
    pub quoted_text: String,
    pub quoted_user: String,
}

impl FlatRow {
    /// Every column that comes from the page is quoted. Only the bucket
    /// date and the sender label, which we format ourselves, are bare.
    pub fn to_csv_line(&self) -> String {
        [
            quote_field(&self.profile_id),
            self.date.clone(),
            quote_field(&self.timestamp),
            quote_field(&self.message),
            self.sender.clone(),
            quote_field(&self.quoted_text),
            quote_field(&self.quoted_user),
        ]
        .join(",")
    }
}

/// Double embedded quotes and wrap the whole field in quotes.
pub fn quote_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// One row per message, conversations in input order, messages in
/// chronological order within each conversation.
pub fn to_flat_rows(details: &[ConversationDetail]) -> Vec<FlatRow> {
    details
        .iter()
        .flat_map(|detail| {
            detail.messages().map(move |(date, message)| FlatRow {
                profile_id: detail.identity.clone(),
                date: date.to_string(),
                timestamp: message.timestamp.clone().unwrap_or_default(),
                message: message.text.clone(),
                sender: message.direction.to_string(),
                quoted_text: message
                    .quoted_content
                    .as_ref()
                    .map(|q| q.text.clone())
                    .unwrap_or_default(),
                quoted_user: message
                    .quoted_content
                    .as_ref()
                    .map(|q| q.attributed_user.clone())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Header line plus one line per row, newline-terminated.
pub fn to_csv(rows: &[FlatRow]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + rows.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_csv_line());
        out.push('\n');
    }
    out
}

/// Nested JSON mirroring `ConversationDetail`, one object per conversation.
pub fn to_hierarchical(details: &[ConversationDetail]) -> Value {
    Value::Array(details.iter().map(detail_value).collect())
}

fn detail_value(detail: &ConversationDetail) -> Value {
    let by_date: Map<String, Value> = detail
        .messages_by_date
        .iter()
        .map(|(date, messages)| {
            (
                date.clone(),
                Value::Array(messages.iter().map(message_value).collect()),
            )
        })
        .collect();

    json!({
        "identity": detail.identity,
        "messagesByDate": by_date,
        "totalMessageCount": detail.total_message_count,
        "firstDate": detail.first_date,
        "lastDate": detail.last_date,
    })
}

fn message_value(message: &MessageRecord) -> Value {
    json!({
        "text": message.text,
        "timestamp": message.timestamp,
        "direction": message.direction,
        "date": message.date,
        "quotedContent": message.quoted_content.as_ref().map(|q| json!({
            "text": q.text,
            "attributedUser": q.attributed_user,
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_common::{Direction, QuotedContent};

    fn message(text: &str, ts: &str, direction: Direction) -> MessageRecord {
        MessageRecord {
            text: text.to_string(),
            timestamp: Some(ts.to_string()),
            direction,
            date: ts[..10].to_string(),
            quoted_content: None,
        }
    }

    fn sample() -> Vec<ConversationDetail> {
        let mut quoted = message("Sure, see you", "2024-05-02T09:00:00Z", Direction::Sent);
        quoted.quoted_content = Some(QuotedContent {
            text: "Lunch \"tomorrow\"?".to_string(),
            attributed_user: "alice".to_string(),
        });
        vec![
            ConversationDetail::assemble(
                "alice",
                vec![
                    quoted,
                    message("He said \"hi\"", "2024-05-01T10:00:00Z", Direction::Received),
                ],
            ),
            ConversationDetail::assemble(
                "bob",
                vec![message("yo", "2024-04-01T08:00:00Z", Direction::Received)],
            ),
        ]
    }

    #[test]
    fn quote_field_doubles_quotes() {
        assert_eq!(quote_field("He said \"hi\""), "\"He said \"\"hi\"\"\"");
        assert_eq!(quote_field(""), "\"\"");
        assert_eq!(quote_field("a,b"), "\"a,b\"");
    }

    #[test]
    fn flat_rows_follow_detail_order() {
        let rows = to_flat_rows(&sample());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].profile_id, "alice");
        assert_eq!(rows[0].date, "2024-05-01");
        assert_eq!(rows[0].sender, "received");
        assert_eq!(rows[1].sender, "sent");
        assert_eq!(rows[1].quoted_user, "alice");
        assert_eq!(rows[2].profile_id, "bob");
    }

    #[test]
    fn csv_has_header_and_quoted_text_columns() {
        let csv = to_csv(&to_flat_rows(&sample()));
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(
            lines.next(),
            Some("\"alice\",2024-05-01,\"2024-05-01T10:00:00Z\",\"He said \"\"hi\"\"\",received,\"\",\"\"")
        );
    }

    #[test]
    fn identity_with_delimiters_stays_in_one_column() {
        let mut details = sample();
        details[0].identity = "o'brien, \"jr\"".into();
        let line = to_flat_rows(&details)[0].to_csv_line();
        assert!(line.starts_with("\"o'brien, \"\"jr\"\"\",2024-05-01,"));
    }

    #[test]
    fn empty_input_is_header_only() {
        assert_eq!(to_csv(&[]), format!("{CSV_HEADER}\n"));
        assert_eq!(to_hierarchical(&[]), json!([]));
    }

    #[test]
    fn hierarchical_mirrors_detail_shape() {
        let value = to_hierarchical(&sample());
        let alice = &value[0];
        assert_eq!(alice["identity"], "alice");
        assert_eq!(alice["totalMessageCount"], 2);
        assert_eq!(alice["firstDate"], "2024-05-01");
        assert_eq!(alice["lastDate"], "2024-05-02");
        let day = &alice["messagesByDate"]["2024-05-02"][0];
        assert_eq!(day["direction"], "SENT");
        assert_eq!(day["quotedContent"]["attributedUser"], "alice");
        assert!(alice["messagesByDate"]["2024-05-01"][0]["quotedContent"].is_null());
    }

    #[test]
    fn hierarchical_matches_serde_shape() {
        let details = sample();
        let via_serde = serde_json::to_value(&details).unwrap();
        assert_eq!(to_hierarchical(&details), via_serde);
    }
}
