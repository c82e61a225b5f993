//! Session repository trait.
//!
//! Defines the interface for remote conversation persistence, decoupling the
//! conversation store from the HTTP wire contract.

use super::conversation::{Conversation, ConversationSummary};
use super::entry::{Entry, Role};
use crate::error::Result;
use async_trait::async_trait;

/// An abstract repository for persisted conversations.
///
/// Implementations talk to the backend history endpoints. The backend's
/// persistence primitive is a full-log replace; implementations that have no
/// direct append endpoint must fetch, append, and write the full log without
/// exposing that fallback to callers.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Lists conversation summaries, newest first. Summaries carry no
    /// message log.
    async fn list_sessions(&self) -> Result<Vec<ConversationSummary>>;

    /// Loads one conversation with its full, ordered message log.
    async fn get_session(&self, id: &str) -> Result<Conversation>;

    /// Persists a new conversation containing exactly `first_entry` and
    /// returns it with the server-assigned id.
    ///
    /// Creation is not idempotent on the server; the caller must issue a
    /// single create per placeholder identity.
    async fn create_session(&self, title: &str, first_entry: &Entry) -> Result<Conversation>;

    /// Appends one entry to an existing conversation, advancing its
    /// `updated_at`. Fails with `NotFound` when the id is unknown.
    async fn append_entry(&self, id: &str, role: Role, content: &str) -> Result<()>;

    /// Removes a conversation. Idempotent: deleting an unknown id succeeds.
    async fn delete_session(&self, id: &str) -> Result<()>;

    /// Renames a conversation.
    async fn update_title(&self, id: &str, title: &str) -> Result<()>;
}
