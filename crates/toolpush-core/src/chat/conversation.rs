//! Conversation domain model.
//!
//! A conversation in the list view may be "summary only": `messages` is
//! `None` until the conversation is opened and hydrated from the repository.
//! Once loaded, the message log is authoritative and a later list refresh
//! must never replace it with an empty one.

use super::entry::Entry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters of the first user message used as a title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Maximum number of characters kept in a list-view digest.
pub const DIGEST_MAX_CHARS: usize = 80;

/// A conversation between the user and the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-assigned id; a placeholder only exists inside an in-flight
    /// creation turn and never lands in the list.
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` while the conversation is summary-only.
    #[serde(default)]
    pub messages: Option<Vec<Entry>>,
    /// Short preview of the most recent entry, for the list view.
    #[serde(default)]
    pub last_message_digest: Option<String>,
}

/// List-view projection of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_digest: Option<String>,
}

impl Conversation {
    /// Builds a summary-only conversation for the list.
    pub fn from_summary(summary: ConversationSummary) -> Self {
        Self {
            id: summary.id,
            title: summary.title,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
            messages: None,
            last_message_digest: summary.last_message_digest,
        }
    }

    /// Projects this conversation into its list-view summary.
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_message_digest: self.last_message_digest.clone(),
        }
    }

    /// The loaded message log, empty when summary-only.
    pub fn loaded_messages(&self) -> &[Entry] {
        self.messages.as_deref().unwrap_or(&[])
    }

    /// True when the message log has been hydrated and is non-empty.
    pub fn has_loaded_messages(&self) -> bool {
        self.messages.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Merges an incoming list summary into this conversation.
    ///
    /// The merge is deliberately asymmetric: a loaded, non-empty message log
    /// always survives. Title, timestamps, and digest take the newest value.
    pub fn merge_summary(&mut self, summary: ConversationSummary) {
        if summary.updated_at >= self.updated_at {
            self.title = summary.title;
            self.updated_at = summary.updated_at;
            if summary.last_message_digest.is_some() {
                self.last_message_digest = summary.last_message_digest;
            }
        }
        // messages untouched: loaded state dominates the summary.
    }

    /// Advances `updated_at` and refreshes the digest after an append.
    pub fn record_append(&mut self, latest_content: &str) {
        self.updated_at = Utc::now();
        self.last_message_digest = Some(digest_content(latest_content));
    }
}

/// Derives a list title from the first user message.
pub fn derive_title(content: &str) -> String {
    truncate_chars(content.trim(), TITLE_MAX_CHARS)
}

/// Derives the short list-view preview of an entry's content.
pub fn digest_content(content: &str) -> String {
    truncate_chars(content.trim(), DIGEST_MAX_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max_chars).collect();
    out.push('…');
    out
}
