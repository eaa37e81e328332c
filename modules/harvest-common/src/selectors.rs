use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// CSS selectors for one web inbox layout. Defaults target an
/// Instagram-style direct inbox; a JSON file can override any subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Scrollable container holding the conversation list.
    pub list_container: String,
    /// One conversation row inside the list.
    pub list_item: String,
    /// Anchor inside a row whose `href` carries the counterpart handle.
    pub item_link: String,
    /// Fallback element inside a row whose text is the handle.
    pub item_handle_text: String,
    /// Element inside a row carrying the last-activity `datetime`.
    pub item_time: String,
    /// Root of an opened conversation.
    pub detail_pane: String,
    /// Rows of the opened conversation: date separators and messages.
    pub timeline_row: String,
    pub date_heading: String,
    pub message_text: String,
    pub message_time: String,
    /// Present inside a row only for bubbles authored by the account owner.
    pub own_marker: String,
    /// Anchor to the author's profile inside a message row.
    pub sender_link: String,
    pub quote_text: String,
    pub quote_author: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            list_container: "div[aria-label='Chats']".to_string(),
            list_item: "div[aria-label='Chats'] div[role='listitem']".to_string(),
            item_link: "a[href]".to_string(),
            item_handle_text: "span[dir='auto']".to_string(),
            item_time: "time[datetime]".to_string(),
            detail_pane: "div[role='main'] div[aria-label^='Messages in conversation']"
                .to_string(),
            timeline_row: "div[role='row']".to_string(),
            date_heading: "h4, div[data-scope='date_break']".to_string(),
            message_text: "div[dir='auto']".to_string(),
            message_time: "time[datetime]".to_string(),
            own_marker: "div[data-scope='messages_table'][class*='outgoing'], div.x1n2onr6.xu3j5b3"
                .to_string(),
            sender_link: "a[href][role='link']".to_string(),
            quote_text: "div[data-scope='replied_message'] div[dir='auto']".to_string(),
            quote_author: "div[data-scope='replied_message'] span[dir='auto']".to_string(),
        }
    }
}

impl Selectors {
    /// Load selector overrides from a JSON file. Missing keys keep their
    /// defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("cannot read selectors {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_defaults() {
        let parsed: Selectors =
            serde_json::from_str(r#"{ "list_item": "li.thread" }"#).unwrap();
        assert_eq!(parsed.list_item, "li.thread");
        assert_eq!(parsed.item_time, Selectors::default().item_time);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = Selectors::from_file(Path::new("/nonexistent/selectors.json")).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }
}
