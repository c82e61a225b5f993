//! Chat domain: entries, conversations, and the persistence/gateway traits.

pub mod conversation;
pub mod entry;
pub mod gateway;
pub mod repository;

pub use conversation::{
    Conversation, ConversationSummary, DIGEST_MAX_CHARS, TITLE_MAX_CHARS, derive_title,
    digest_content,
};
pub use entry::{AttachmentMeta, Entry, EntryFlags, Role};
pub use gateway::{AssistantGateway, PromptMessage};
pub use repository::SessionRepository;
