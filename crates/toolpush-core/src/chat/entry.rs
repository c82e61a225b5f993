//! Chat entry domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a chat entry.
///
/// `SystemError` is client-local: it renders failures inline in the log and
/// is never sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Assistant,
    SystemError,
}

impl Role {
    /// The wire name for roles the backend understands.
    pub fn wire_name(&self) -> Option<&'static str> {
        match self {
            Role::User => Some("user"),
            Role::Assistant => Some("assistant"),
            Role::SystemError => None,
        }
    }

    /// Parses a wire role string.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// Client-local state flags on an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    /// Set at creation, cleared on successful persistence.
    #[serde(default)]
    pub pending: bool,
    /// The entry reports a failed turn.
    #[serde(default)]
    pub is_error: bool,
    /// The failure was the per-plan daily message quota.
    #[serde(default)]
    pub is_quota_error: bool,
    /// The entry is visible but its persistence failed.
    #[serde(default)]
    pub unsaved: bool,
}

/// Descriptor of a file attached to an entry. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Client-unique id used for deduplication; UUID v4, never wall-clock.
    pub local_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    #[serde(default)]
    pub flags: EntryFlags,
}

impl Entry {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            local_id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            attachments: Vec::new(),
            flags: EntryFlags::default(),
        }
    }

    /// Creates a pending user entry with a fresh local id.
    pub fn user(content: impl Into<String>, attachments: Vec<AttachmentMeta>) -> Self {
        let mut entry = Self::new(Role::User, content);
        entry.attachments = attachments;
        entry.flags.pending = true;
        entry
    }

    /// Creates an assistant entry.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a generic system-error entry.
    pub fn system_error(content: impl Into<String>) -> Self {
        let mut entry = Self::new(Role::SystemError, content);
        entry.flags.is_error = true;
        entry
    }

    /// Creates the distinguished quota-exhausted error entry.
    ///
    /// The rendered text always carries both counts when the backend supplied
    /// them, so the paywall copy can show "used of limit".
    pub fn quota_error(used: Option<u32>, limit: Option<u32>, detail: &str) -> Self {
        let content = match (used, limit) {
            (Some(used), Some(limit)) => format!(
                "You've reached your daily message limit ({used}/{limit}). \
                 Upgrade your plan or come back tomorrow."
            ),
            _ if !detail.trim().is_empty() => detail.trim().to_string(),
            _ => "You've reached your daily message limit for today.".to_string(),
        };
        let mut entry = Self::system_error(content);
        entry.flags.is_quota_error = true;
        entry
    }

    /// Overrides the local id; used by callers replaying a send.
    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = local_id.into();
        self
    }

    /// Marks the entry as successfully persisted.
    pub fn clear_pending(&mut self) {
        self.flags.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_entries_start_pending_with_unique_local_ids() {
        let a = Entry::user("spud date?", Vec::new());
        let b = Entry::user("spud date?", Vec::new());
        assert!(a.flags.pending);
        assert_ne!(a.local_id, b.local_id);
    }

    #[test]
    fn local_ids_generated_back_to_back_differ() {
        // Placeholder identity must be collision-resistant, not wall-clock.
        let ids: Vec<String> = (0..64)
            .map(|_| Entry::user("x", Vec::new()).local_id)
            .collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn quota_entry_renders_both_counts() {
        let entry = Entry::quota_error(Some(10), Some(10), "Daily message limit exceeded (10/10)");
        assert!(entry.flags.is_quota_error);
        assert!(entry.flags.is_error);
        assert!(entry.content.contains("10/10"));
    }

    #[test]
    fn quota_entry_falls_back_to_detail_text() {
        let entry = Entry::quota_error(None, None, "Daily limit reached");
        assert_eq!(entry.content, "Daily limit reached");
    }

    #[test]
    fn system_error_role_has_no_wire_name() {
        assert_eq!(Role::SystemError.wire_name(), None);
        assert_eq!(Role::from_wire("user"), Some(Role::User));
        assert_eq!(Role::from_wire("tool"), None);
    }
}
