//! Assistant gateway trait and prompt projection.

use super::entry::{Entry, Role};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One message of the prompt log sent to the assistant backend.
///
/// The projection deliberately drops local ids, flags, timestamps, and
/// attachments; the backend sees roles and contents only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    /// Projects an ordered entry log into the prompt log.
    ///
    /// Client-local error entries are dropped; they were never part of the
    /// dialogue the assistant should see.
    pub fn project(entries: &[Entry]) -> Vec<PromptMessage> {
        entries
            .iter()
            .filter(|e| !e.flags.is_error)
            .filter_map(|e| {
                e.role.wire_name().map(|role| PromptMessage {
                    role: role.to_string(),
                    content: e.content.clone(),
                })
            })
            .collect()
    }
}

/// Gateway to the hosted LLM.
///
/// One call, one reply; there is no token streaming in this contract.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Submits the full ordered prompt log and returns one assistant reply.
    ///
    /// `session_id`, when present, lets the server correlate quota accounting
    /// and persistence hints; it never changes the reply contract.
    async fn generate(
        &self,
        messages: &[PromptMessage],
        session_id: Option<&str>,
    ) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_strips_local_fields_and_error_entries() {
        let entries = vec![
            Entry::user("rig move window?", Vec::new()),
            Entry::assistant("weather holds through Friday"),
            Entry::system_error("something went wrong"),
        ];

        let log = PromptMessage::project(&entries);

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, "user");
        assert_eq!(log[0].content, "rig move window?");
        assert_eq!(log[1].role, "assistant");
    }

    #[test]
    fn projection_keeps_pending_user_entries() {
        let entries = vec![Entry::user("hi", Vec::new())];
        assert_eq!(PromptMessage::project(&entries).len(), 1);
    }

    #[test]
    fn role_enum_is_ignored_for_wire_roles() {
        let mut entry = Entry::assistant("ok");
        entry.role = Role::SystemError;
        entry.flags.is_error = false;
        assert!(PromptMessage::project(&[entry]).is_empty());
    }
}
