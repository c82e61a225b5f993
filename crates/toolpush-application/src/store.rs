//! The conversation store and its turn orchestrator.
//!
//! `ConversationStore` is the authoritative in-memory model of the user's
//! conversations. All reads go through synchronous selectors; all writes go
//! through explicit async commands executed on the cooperative executor.
//! There are no reactive effects: the turn is a command, and a single
//! `creating_new_chat` latch suppresses message hydration while a create is
//! in flight, so the turn stays the only writer of the optimistic log.

use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use toolpush_core::auth::AuthSession;
use toolpush_core::chat::{
    AssistantGateway, AttachmentMeta, Conversation, ConversationSummary, Entry, PromptMessage,
    Role, SessionRepository, derive_title,
};
use toolpush_core::error::ApiError;
use uuid::Uuid;

/// Commands the store refuses outright, as opposed to turn failures that
/// surface as error entries in the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("a turn is already in flight")]
    TurnInFlight,
}

/// Where the active selection changed from, so the route binder can decide
/// between a history push and an in-place replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    /// The user picked a conversation (or cleared the selection).
    User,
    /// The store assigned a server id to a conversation mid-turn.
    Internal,
}

/// Events the store publishes for thin adapters such as the route binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ActiveChanged {
        id: Option<String>,
        origin: SelectionOrigin,
    },
}

/// Observable phases of a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    AppendingUser,
    EnsuringSession,
    AwaitingAssistant,
    AppendingAssistant,
    Finalizing,
}

/// Input to `send_message`.
#[derive(Debug, Clone, Default)]
pub struct SendInput {
    pub content: String,
    pub attachments: Vec<AttachmentMeta>,
    /// Explicit local id for replayed sends; a fresh UUID v4 otherwise.
    pub local_id: Option<String>,
}

impl SendInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }
}

/// Result of a `send_message` command.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The assistant replied and the log was finalized.
    Completed { reply: String },
    /// The turn failed; an error entry (or nothing, for `AuthMissing`)
    /// is already visible in the log.
    Failed(ApiError),
    /// Empty input or a duplicate local id; nothing happened.
    Ignored,
}

/// Identity a turn binds to for its whole lifetime.
///
/// A creating turn holds a placeholder drawn from a collision-resistant
/// generator; the placeholder is never handed to the repository twice.
#[derive(Debug, Clone)]
enum TurnScope {
    Existing(String),
    Creating { placeholder: String },
}

impl TurnScope {
    fn label(&self) -> &str {
        match self {
            TurnScope::Existing(id) => id,
            TurnScope::Creating { placeholder } => placeholder,
        }
    }
}

#[derive(Default)]
struct StoreState {
    /// Ordered by `updated_at` descending.
    conversations: Vec<Conversation>,
    active: Option<String>,
    /// Message log of the not-yet-persisted conversation (active = none).
    draft: Vec<Entry>,
    phase: TurnPhase,
    creating_new_chat: bool,
    loading_list: bool,
}

impl StoreState {
    fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    fn push_entry(&mut self, id: &str, entry: Entry) -> bool {
        match self.conversation_mut(id) {
            Some(conversation) => {
                conversation
                    .messages
                    .get_or_insert_with(Vec::new)
                    .push(entry);
                true
            }
            None => false,
        }
    }
}

/// Authoritative in-memory conversation model plus the turn state machine.
pub struct ConversationStore {
    state: Mutex<StoreState>,
    repository: Arc<dyn SessionRepository>,
    gateway: Arc<dyn AssistantGateway>,
    events: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    pub fn new(repository: Arc<dyn SessionRepository>, gateway: Arc<dyn AssistantGateway>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Mutex::new(StoreState::default()),
            repository,
            gateway,
            events,
        }
    }

    /// Subscribes to store events (active-selection changes).
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut state = self.state.lock().expect("store state lock poisoned");
        f(&mut state)
    }

    // -----------------------------------------------------------------------
    // Read selectors (pure, synchronous)
    // -----------------------------------------------------------------------

    /// Ordered summaries for the list view, newest first.
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.with_state(|s| s.conversations.iter().map(|c| c.summary()).collect())
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.with_state(|s| s.active.clone())
    }

    /// Entries of the active conversation; the draft log when none is open.
    pub fn messages(&self) -> Vec<Entry> {
        self.with_state(|s| match &s.active {
            Some(id) => s
                .conversation(id)
                .map(|c| c.loaded_messages().to_vec())
                .unwrap_or_default(),
            None => s.draft.clone(),
        })
    }

    pub fn is_turn_in_flight(&self) -> bool {
        self.with_state(|s| s.phase != TurnPhase::Idle)
    }

    pub fn turn_phase(&self) -> TurnPhase {
        self.with_state(|s| s.phase)
    }

    pub fn is_loading_list(&self) -> bool {
        self.with_state(|s| s.loading_list)
    }

    pub fn is_creating_new_chat(&self) -> bool {
        self.with_state(|s| s.creating_new_chat)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Clears the selection so the next turn creates a conversation.
    /// Purely local and idempotent; no remote record is produced.
    pub fn new_conversation(&self) {
        let changed = self.with_state(|s| {
            let changed = s.active.is_some() || !s.draft.is_empty();
            s.active = None;
            s.draft.clear();
            changed
        });
        if changed {
            self.emit(StoreEvent::ActiveChanged {
                id: None,
                origin: SelectionOrigin::User,
            });
        }
    }

    /// Opens a conversation, hydrating its message log on first view.
    ///
    /// Never fails to the caller: a failed load falls back to an empty log.
    /// Issued while a turn is in flight on another conversation, it does not
    /// cancel that turn. Re-selecting the active conversation emits no event
    /// but still retries hydration, so a log left empty by a suppressed or
    /// failed load is recovered on the next visit.
    pub async fn select_conversation(&self, id: &str) {
        let (changed, needs_hydration) = self.with_state(|s| {
            let changed = s.active.as_deref() != Some(id);
            s.active = Some(id.to_string());
            if s.creating_new_chat {
                // The in-flight create owns messages right now.
                tracing::debug!(conversation = %id, "hydration suppressed during create-in-flight");
                return (changed, false);
            }
            let loaded = s
                .conversation(id)
                .map(|c| c.has_loaded_messages())
                .unwrap_or(false);
            (changed, !loaded)
        });

        if changed {
            self.emit(StoreEvent::ActiveChanged {
                id: Some(id.to_string()),
                origin: SelectionOrigin::User,
            });
        }
        if needs_hydration {
            self.hydrate(id).await;
        }
    }

    async fn hydrate(&self, id: &str) {
        match self.repository.get_session(id).await {
            Ok(full) => self.with_state(|s| {
                if s.creating_new_chat {
                    return;
                }
                match s.conversation_mut(id) {
                    Some(existing) => {
                        // A log loaded (or written by a turn) in the meantime
                        // stays authoritative.
                        if !existing.has_loaded_messages() {
                            existing.messages = full.messages.clone();
                        }
                        existing.merge_summary(full.summary());
                    }
                    None => s.conversations.push(full),
                }
            }),
            Err(err) => {
                tracing::error!(conversation = %id, error = %err, "failed to load conversation; showing empty log");
                self.with_state(|s| match s.conversation_mut(id) {
                    Some(existing) => {
                        if existing.messages.is_none() {
                            existing.messages = Some(Vec::new());
                        }
                    }
                    None => {
                        let now = chrono::Utc::now();
                        s.conversations.push(Conversation {
                            id: id.to_string(),
                            title: "Untitled".to_string(),
                            created_at: now,
                            updated_at: now,
                            messages: Some(Vec::new()),
                            last_message_digest: None,
                        });
                    }
                });
            }
        }
    }

    /// Executes one full user turn: optimistic append, create-or-append,
    /// assistant generation, assistant append, finalize.
    pub async fn send_message(&self, input: SendInput) -> Result<SendOutcome, StoreError> {
        let content = input.content.trim().to_string();
        if content.is_empty() {
            tracing::debug!("ignoring empty send");
            return Ok(SendOutcome::Ignored);
        }

        let mut user_entry = Entry::user(content.clone(), input.attachments);
        if let Some(local_id) = input.local_id {
            user_entry = user_entry.with_local_id(local_id);
        }

        // Snapshot and optimistic append under a single lock.
        let setup = self.with_state(|s| {
            if s.phase != TurnPhase::Idle {
                return Err(StoreError::TurnInFlight);
            }
            let scope = match &s.active {
                Some(id) => TurnScope::Existing(id.clone()),
                None => TurnScope::Creating {
                    placeholder: Uuid::new_v4().to_string(),
                },
            };
            let prior: Vec<Entry> = match &scope {
                TurnScope::Existing(id) => s
                    .conversation(id)
                    .map(|c| c.loaded_messages().to_vec())
                    .unwrap_or_default(),
                TurnScope::Creating { .. } => s.draft.clone(),
            };
            if prior.iter().any(|e| e.local_id == user_entry.local_id) {
                tracing::debug!(local_id = %user_entry.local_id, "duplicate send suppressed");
                return Ok(None);
            }

            s.phase = TurnPhase::AppendingUser;
            match &scope {
                TurnScope::Existing(id) => {
                    s.push_entry(id, user_entry.clone());
                }
                TurnScope::Creating { .. } => {
                    s.creating_new_chat = true;
                    s.draft.push(user_entry.clone());
                }
            }

            let mut full_log = prior;
            full_log.push(user_entry.clone());
            Ok(Some((scope, PromptMessage::project(&full_log), full_log)))
        })?;

        let Some((scope, prompt_log, full_log)) = setup else {
            return Ok(SendOutcome::Ignored);
        };
        tracing::debug!(turn = %scope.label(), entries = full_log.len(), "turn started");

        // Ensure the session exists and carries the user entry.
        self.with_state(|s| s.phase = TurnPhase::EnsuringSession);
        let conversation_id = match &scope {
            TurnScope::Existing(id) => {
                if let Err(err) = self.repository.append_entry(id, Role::User, &content).await {
                    self.fail_turn(&scope, &user_entry.local_id, &err);
                    return Ok(SendOutcome::Failed(err));
                }
                self.with_state(|s| {
                    if let Some(conversation) = s.conversation_mut(id) {
                        if let Some(messages) = conversation.messages.as_mut() {
                            if let Some(entry) = messages
                                .iter_mut()
                                .find(|e| e.local_id == user_entry.local_id)
                            {
                                entry.clear_pending();
                            }
                        }
                        conversation.record_append(&content);
                    }
                });
                id.clone()
            }
            TurnScope::Creating { .. } => {
                let title = derive_title(&content);
                match self.repository.create_session(&title, &user_entry).await {
                    Ok(created) => {
                        let server_id = created.id.clone();
                        let became_active = self.with_state(|s| {
                            let mut conversation = created;
                            let mut log = full_log.clone();
                            if let Some(entry) = log
                                .iter_mut()
                                .find(|e| e.local_id == user_entry.local_id)
                            {
                                entry.clear_pending();
                            }
                            conversation.messages = Some(log);
                            s.conversations.insert(0, conversation);
                            s.creating_new_chat = false;
                            if s.active.is_none() {
                                s.active = Some(server_id.clone());
                                s.draft.clear();
                                true
                            } else {
                                // The user navigated elsewhere mid-create;
                                // leave their selection alone.
                                s.draft.retain(|e| e.local_id != user_entry.local_id);
                                false
                            }
                        });
                        if became_active {
                            self.emit(StoreEvent::ActiveChanged {
                                id: Some(server_id.clone()),
                                origin: SelectionOrigin::Internal,
                            });
                        }
                        server_id
                    }
                    Err(err) => {
                        self.fail_turn(&scope, &user_entry.local_id, &err);
                        return Ok(SendOutcome::Failed(err));
                    }
                }
            }
        };

        // Invoke the assistant with the full ordered log.
        self.with_state(|s| s.phase = TurnPhase::AwaitingAssistant);
        let reply = match self
            .gateway
            .generate(&prompt_log, Some(&conversation_id))
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                self.report_generation_failure(&conversation_id, &err);
                self.with_state(|s| s.phase = TurnPhase::Idle);
                return Ok(SendOutcome::Failed(err));
            }
        };

        // Optimistic assistant append, bound to the id the turn started on.
        self.with_state(|s| s.phase = TurnPhase::AppendingAssistant);
        let assistant_entry = Entry::assistant(reply.clone());
        let visible = self.with_state(|s| s.push_entry(&conversation_id, assistant_entry.clone()));
        if !visible {
            tracing::debug!(conversation = %conversation_id, "conversation deleted mid-turn; reply dropped");
        }

        if let Err(err) = self
            .repository
            .append_entry(&conversation_id, Role::Assistant, &reply)
            .await
        {
            if err.is_not_found() {
                // Deleted while the turn was in flight; swallowed by contract.
                tracing::debug!(conversation = %conversation_id, "assistant append after delete ignored");
            } else {
                tracing::warn!(conversation = %conversation_id, error = %err, "assistant entry kept locally but not persisted");
                self.with_state(|s| {
                    if let Some(conversation) = s.conversation_mut(&conversation_id) {
                        if let Some(messages) = conversation.messages.as_mut() {
                            if let Some(entry) = messages
                                .iter_mut()
                                .find(|e| e.local_id == assistant_entry.local_id)
                            {
                                entry.flags.unsaved = true;
                            }
                        }
                    }
                });
            }
        }

        // Finalize: digest, timestamps, move to the head of the list.
        self.with_state(|s| {
            s.phase = TurnPhase::Finalizing;
            if let Some(pos) = s.position(&conversation_id) {
                s.conversations[pos].record_append(&reply);
                let conversation = s.conversations.remove(pos);
                s.conversations.insert(0, conversation);
            }
            s.phase = TurnPhase::Idle;
        });
        tracing::debug!(conversation = %conversation_id, "turn completed");
        Ok(SendOutcome::Completed { reply })
    }

    /// Rolls back the optimistic user entry and reports a step-3 failure.
    fn fail_turn(&self, scope: &TurnScope, local_id: &str, err: &ApiError) {
        let report = error_entry_for(err);
        self.with_state(|s| {
            match scope {
                TurnScope::Existing(id) => {
                    if let Some(conversation) = s.conversation_mut(id) {
                        if let Some(messages) = conversation.messages.as_mut() {
                            messages.retain(|e| e.local_id != local_id);
                        }
                    }
                    if let Some(entry) = report.clone() {
                        s.push_entry(id, entry);
                    }
                }
                TurnScope::Creating { .. } => {
                    s.draft.retain(|e| e.local_id != local_id);
                    if let Some(entry) = report.clone() {
                        s.draft.push(entry);
                    }
                }
            }
            s.creating_new_chat = false;
            s.phase = TurnPhase::Idle;
        });
        if err.is_auth_missing() {
            tracing::warn!(turn = %scope.label(), "send aborted: not signed in");
        } else {
            tracing::error!(turn = %scope.label(), error = %err, "turn failed while persisting user entry");
        }
    }

    /// Appends the error entry for a failed generation. The user entry is
    /// already persisted at this point and stays.
    fn report_generation_failure(&self, conversation_id: &str, err: &ApiError) {
        // Identity loss mid-turn still deserves a visible re-auth prompt.
        let entry = error_entry_for(err)
            .unwrap_or_else(|| Entry::system_error(REAUTH_MESSAGE));
        let visible = self.with_state(|s| s.push_entry(conversation_id, entry));
        if !visible {
            tracing::debug!(conversation = %conversation_id, "generation failure on deleted conversation ignored");
        }
        tracing::error!(conversation = %conversation_id, error = %err, "assistant generation failed");
    }

    /// Deletes a conversation. A turn in flight against it is allowed to
    /// complete; its persistence failure is swallowed.
    pub async fn delete_conversation(&self, id: &str) -> Result<(), ApiError> {
        self.repository.delete_session(id).await?;
        let was_active = self.with_state(|s| {
            s.conversations.retain(|c| c.id != id);
            if s.active.as_deref() == Some(id) {
                s.active = None;
                s.draft.clear();
                true
            } else {
                false
            }
        });
        if was_active {
            self.emit(StoreEvent::ActiveChanged {
                id: None,
                origin: SelectionOrigin::User,
            });
        }
        Ok(())
    }

    /// Renames a conversation; on success only the title field changes.
    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<(), ApiError> {
        self.repository.update_title(id, title).await?;
        self.with_state(|s| {
            if let Some(conversation) = s.conversation_mut(id) {
                conversation.title = title.to_string();
            }
        });
        Ok(())
    }

    /// Refetches the conversation list and merges it under the
    /// loaded-messages preservation rule.
    pub async fn refresh_list(&self) {
        self.with_state(|s| s.loading_list = true);
        match self.repository.list_sessions().await {
            Ok(summaries) => self.with_state(|s| {
                let mut previous = std::mem::take(&mut s.conversations);
                let mut merged = Vec::with_capacity(summaries.len());
                for summary in summaries {
                    if let Some(pos) = previous.iter().position(|c| c.id == summary.id) {
                        let mut existing = previous.remove(pos);
                        existing.merge_summary(summary);
                        merged.push(existing);
                    } else {
                        merged.push(Conversation::from_summary(summary));
                    }
                }
                // Conversations the server has not caught up with yet (a
                // create still in flight) survive the refresh.
                for leftover in previous {
                    if leftover.loaded_messages().iter().any(|e| e.flags.pending) {
                        merged.push(leftover);
                    }
                }
                merged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                s.conversations = merged;
                s.loading_list = false;
            }),
            Err(err) => {
                tracing::error!(error = %err, "failed to refresh conversation list");
                self.with_state(|s| s.loading_list = false);
            }
        }
    }

    /// Reacts to identity changes: load the list on sign-in, empty all
    /// state on sign-out.
    pub async fn handle_identity(&self, session: Option<AuthSession>) {
        match session {
            Some(_) => self.refresh_list().await,
            None => {
                self.with_state(|s| *s = StoreState::default());
                self.emit(StoreEvent::ActiveChanged {
                    id: None,
                    origin: SelectionOrigin::User,
                });
            }
        }
    }

    /// Drives `handle_identity` from an auth watch channel until the
    /// channel closes.
    pub async fn watch_identity(
        self: Arc<Self>,
        mut identity: watch::Receiver<Option<AuthSession>>,
    ) {
        loop {
            let current = identity.borrow_and_update().clone();
            self.handle_identity(current).await;
            if identity.changed().await.is_err() {
                break;
            }
        }
    }
}

const REAUTH_MESSAGE: &str = "Your session has expired. Please sign in again.";

/// Maps a turn failure onto the entry rendered in the log.
///
/// `AuthMissing` yields no entry: the command fails without mutating state.
fn error_entry_for(err: &ApiError) -> Option<Entry> {
    match err {
        ApiError::AuthMissing => None,
        ApiError::QuotaExceeded {
            used,
            limit,
            detail,
        } => Some(Entry::quota_error(*used, *limit, detail)),
        ApiError::AuthRejected { .. } => Some(Entry::system_error(REAUTH_MESSAGE)),
        ApiError::NotFound { .. } => Some(Entry::system_error(
            "This conversation is no longer available.",
        )),
        ApiError::Validation { .. } | ApiError::Server { .. } | ApiError::Network { .. } => {
            Some(Entry::system_error(
                "Something went wrong while sending your message. Please try again.",
            ))
        }
    }
}
