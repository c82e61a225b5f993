//! HTTP-backed session repository over the backend history endpoints.
//!
//! The backend's only write primitive is a full-log replace (`POST /history`
//! with the complete message list). Appends and renames therefore fetch the
//! current log, modify it, and write it back; that fallback never leaks past
//! the `SessionRepository` trait.

use crate::transport::ApiClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use toolpush_core::chat::{
    Conversation, ConversationSummary, Entry, Role, SessionRepository, digest_content,
};
use toolpush_core::error::{ApiError, Result};
use uuid::Uuid;

pub struct HttpSessionRepository {
    client: Arc<ApiClient>,
}

impl HttpSessionRepository {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    async fn fetch_session(&self, id: &str) -> Result<WireSession> {
        let value = self.client.get(&format!("/history/{id}")).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::server(200, format!("malformed session payload: {e}")))
    }

    /// Writes the full log back under the same chat id.
    async fn replace_log(&self, id: &str, title: &str, messages: Vec<WireMessage>) -> Result<()> {
        let request = SaveSessionRequest {
            chat_id: Some(id.to_string()),
            title: title.to_string(),
            messages,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::validation(format!("failed to encode session: {e}")))?;
        self.client.post("/history", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for HttpSessionRepository {
    async fn list_sessions(&self) -> Result<Vec<ConversationSummary>> {
        let value = self.client.get("/history").await?;
        let wire: Vec<WireSummary> = serde_json::from_value(value)
            .map_err(|e| ApiError::server(200, format!("malformed history payload: {e}")))?;
        let mut summaries: Vec<ConversationSummary> =
            wire.into_iter().map(WireSummary::into_summary).collect();
        // Newest first, regardless of what the server returned.
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn get_session(&self, id: &str) -> Result<Conversation> {
        let wire = self.fetch_session(id).await?;
        Ok(wire.into_conversation())
    }

    async fn create_session(&self, title: &str, first_entry: &Entry) -> Result<Conversation> {
        let chat_id = Uuid::new_v4().to_string();
        let messages = vec![WireMessage::from_entry(first_entry)];
        let request = SaveSessionRequest {
            chat_id: Some(chat_id.clone()),
            title: title.to_string(),
            messages,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ApiError::validation(format!("failed to encode session: {e}")))?;
        let response = self.client.post("/history", &body).await?;

        // The echoed chat_id is authoritative; fall back to ours if the
        // response omits it.
        let id = extract_chat_id(&response).unwrap_or(chat_id);
        let now = Utc::now();
        let mut persisted = first_entry.clone();
        persisted.clear_pending();
        Ok(Conversation {
            id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            messages: Some(vec![persisted]),
            last_message_digest: Some(digest_content(&first_entry.content)),
        })
    }

    async fn append_entry(&self, id: &str, role: Role, content: &str) -> Result<()> {
        let Some(wire_role) = role.wire_name() else {
            // Client-local roles are never persisted.
            return Ok(());
        };
        let session = self.fetch_session(id).await?;
        let mut messages = session.messages;
        messages.push(WireMessage {
            role: wire_role.to_string(),
            content: content.to_string(),
            timestamp: Some(Utc::now()),
        });
        let title = session.title.as_deref().unwrap_or("Untitled");
        self.replace_log(id, title, messages).await
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        match self.client.delete(&format!("/history/{id}")).await {
            Ok(_) => Ok(()),
            // Idempotent: a second delete of the same id is a success.
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn update_title(&self, id: &str, title: &str) -> Result<()> {
        let session = self.fetch_session(id).await?;
        self.replace_log(id, title, session.messages).await
    }
}

fn extract_chat_id(response: &Value) -> Option<String> {
    response
        .get("chat_id")
        .or_else(|| response.get("id"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

// ---------------------------------------------------------------------------
// Wire representations
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

impl WireMessage {
    fn from_entry(entry: &Entry) -> Self {
        Self {
            role: entry
                .role
                .wire_name()
                .unwrap_or("user")
                .to_string(),
            content: entry.content.clone(),
            timestamp: Some(entry.timestamp),
        }
    }

    fn into_entry(self) -> Option<Entry> {
        let role = Role::from_wire(&self.role)?;
        let mut entry = match role {
            Role::User => {
                let mut e = Entry::user(self.content, Vec::new());
                e.clear_pending();
                e
            }
            Role::Assistant => Entry::assistant(self.content),
            Role::SystemError => return None,
        };
        if let Some(timestamp) = self.timestamp {
            entry.timestamp = timestamp;
        }
        Some(entry)
    }
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    #[serde(alias = "chat_id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_message: Option<String>,
}

impl WireSummary {
    fn into_summary(self) -> ConversationSummary {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        ConversationSummary {
            id: self.id,
            title: self.title.unwrap_or_else(|| "Untitled".to_string()),
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
            last_message_digest: self.last_message.map(|m| digest_content(&m)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSession {
    #[serde(alias = "chat_id")]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    messages: Vec<WireMessage>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl WireSession {
    fn into_conversation(self) -> Conversation {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let updated_at = self.updated_at.unwrap_or(created_at);
        let last_message_digest = self
            .messages
            .last()
            .map(|m| digest_content(&m.content));
        let entries: Vec<Entry> = self
            .messages
            .into_iter()
            .filter_map(WireMessage::into_entry)
            .collect();
        Conversation {
            id: self.id,
            title: self.title.unwrap_or_else(|| "Untitled".to_string()),
            created_at,
            updated_at,
            messages: Some(entries),
            last_message_digest,
        }
    }
}

#[derive(Debug, Serialize)]
struct SaveSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<String>,
    title: String,
    messages: Vec<WireMessage>,
}
