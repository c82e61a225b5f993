//! Route binder: maps the active selection onto `/chat` URLs and back.
//!
//! The store is the source of truth; the binder is a thin adapter. It tags
//! every URL it emits and ignores that same URL when it comes back through
//! the change handler, which breaks the store → URL → store cycle during
//! mid-turn id assignment.

use crate::store::{ConversationStore, SelectionOrigin, StoreEvent};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// External navigation collaborator: current URL plus push/replace.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    /// History push; used for user-originated selection changes.
    fn push(&self, path: &str);
    /// In-place replacement; used when the store assigns an id internally.
    fn replace(&self, path: &str);
}

pub struct RouteBinder {
    store: Arc<ConversationStore>,
    navigator: Arc<dyn Navigator>,
    last_emitted: Mutex<Option<String>>,
}

impl RouteBinder {
    pub fn new(store: Arc<ConversationStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            last_emitted: Mutex::new(None),
        }
    }

    /// Builds the URL for a selection.
    pub fn chat_path(id: Option<&str>) -> String {
        match id {
            Some(id) => format!("/chat/{id}"),
            None => "/chat".to_string(),
        }
    }

    /// Parses a URL into a selection. `None` means the path is not a chat
    /// route; `Some(None)` is the bare `/chat` route.
    pub fn parse_chat_path(path: &str) -> Option<Option<String>> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let rest = path.strip_prefix("/chat")?;
        match rest.trim_matches('/') {
            "" => Some(None),
            id if !id.contains('/') => Some(Some(id.to_string())),
            _ => None,
        }
    }

    /// Applies one store event to the external URL.
    pub fn apply_event(&self, event: &StoreEvent) {
        let StoreEvent::ActiveChanged { id, origin } = event;
        let path = Self::chat_path(id.as_deref());
        if self.navigator.current_path() == path {
            return;
        }
        *self.last_emitted.lock().expect("route lock poisoned") = Some(path.clone());
        match origin {
            SelectionOrigin::Internal => self.navigator.replace(&path),
            SelectionOrigin::User => self.navigator.push(&path),
        }
    }

    /// Reacts to an external URL change, ignoring the ones this binder just
    /// emitted.
    pub async fn handle_url_change(&self, path: &str) {
        {
            let mut last = self.last_emitted.lock().expect("route lock poisoned");
            if last.as_deref() == Some(path) {
                last.take();
                tracing::debug!(%path, "ignoring self-emitted URL change");
                return;
            }
        }
        match Self::parse_chat_path(path) {
            Some(Some(id)) => self.store.select_conversation(&id).await,
            Some(None) => self.store.new_conversation(),
            None => {}
        }
    }

    /// Pumps store events into the navigator until the store goes away.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<StoreEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.apply_event(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "route binder lagged behind store events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolpush_core::chat::{
        AssistantGateway, Conversation, ConversationSummary, Entry, PromptMessage, Role,
        SessionRepository,
    };
    use toolpush_core::error::ApiError;

    struct NullRepository;

    #[async_trait]
    impl SessionRepository for NullRepository {
        async fn list_sessions(&self) -> Result<Vec<ConversationSummary>, ApiError> {
            Ok(Vec::new())
        }
        async fn get_session(&self, id: &str) -> Result<Conversation, ApiError> {
            Err(ApiError::not_found(id.to_string()))
        }
        async fn create_session(
            &self,
            _title: &str,
            _first_entry: &Entry,
        ) -> Result<Conversation, ApiError> {
            Err(ApiError::network("unavailable"))
        }
        async fn append_entry(
            &self,
            id: &str,
            _role: Role,
            _content: &str,
        ) -> Result<(), ApiError> {
            Err(ApiError::not_found(id.to_string()))
        }
        async fn delete_session(&self, _id: &str) -> Result<(), ApiError> {
            Ok(())
        }
        async fn update_title(&self, id: &str, _title: &str) -> Result<(), ApiError> {
            Err(ApiError::not_found(id.to_string()))
        }
    }

    struct NullGateway;

    #[async_trait]
    impl AssistantGateway for NullGateway {
        async fn generate(
            &self,
            _messages: &[PromptMessage],
            _session_id: Option<&str>,
        ) -> Result<String, ApiError> {
            Err(ApiError::network("unavailable"))
        }
    }

    #[derive(Default)]
    struct RecordingNavigator {
        current: Mutex<String>,
        operations: Mutex<Vec<(String, String)>>,
    }

    impl Navigator for RecordingNavigator {
        fn current_path(&self) -> String {
            self.current.lock().unwrap().clone()
        }
        fn push(&self, path: &str) {
            *self.current.lock().unwrap() = path.to_string();
            self.operations
                .lock()
                .unwrap()
                .push(("push".into(), path.to_string()));
        }
        fn replace(&self, path: &str) {
            *self.current.lock().unwrap() = path.to_string();
            self.operations
                .lock()
                .unwrap()
                .push(("replace".into(), path.to_string()));
        }
    }

    fn binder() -> (Arc<ConversationStore>, Arc<RecordingNavigator>, RouteBinder) {
        let store = Arc::new(ConversationStore::new(
            Arc::new(NullRepository),
            Arc::new(NullGateway),
        ));
        let navigator = Arc::new(RecordingNavigator::default());
        let binder = RouteBinder::new(store.clone(), navigator.clone());
        (store, navigator, binder)
    }

    #[test]
    fn parses_chat_routes() {
        assert_eq!(RouteBinder::parse_chat_path("/chat"), Some(None));
        assert_eq!(RouteBinder::parse_chat_path("/chat/"), Some(None));
        assert_eq!(
            RouteBinder::parse_chat_path("/chat/abc-123"),
            Some(Some("abc-123".to_string()))
        );
        assert_eq!(
            RouteBinder::parse_chat_path("/chat/abc?tab=files"),
            Some(Some("abc".to_string()))
        );
        assert_eq!(RouteBinder::parse_chat_path("/pricing"), None);
        assert_eq!(RouteBinder::parse_chat_path("/chat/a/b"), None);
    }

    #[test]
    fn internal_id_assignment_replaces_instead_of_pushing() {
        let (_store, navigator, binder) = binder();
        binder.apply_event(&StoreEvent::ActiveChanged {
            id: Some("srv-1".into()),
            origin: SelectionOrigin::Internal,
        });
        assert_eq!(
            navigator.operations.lock().unwrap().as_slice(),
            &[("replace".to_string(), "/chat/srv-1".to_string())]
        );
    }

    #[test]
    fn user_selection_pushes() {
        let (_store, navigator, binder) = binder();
        binder.apply_event(&StoreEvent::ActiveChanged {
            id: Some("abc".into()),
            origin: SelectionOrigin::User,
        });
        binder.apply_event(&StoreEvent::ActiveChanged {
            id: None,
            origin: SelectionOrigin::User,
        });
        assert_eq!(
            navigator.operations.lock().unwrap().as_slice(),
            &[
                ("push".to_string(), "/chat/abc".to_string()),
                ("push".to_string(), "/chat".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn self_emitted_url_change_does_not_reenter_the_store() {
        let (store, _navigator, binder) = binder();
        binder.apply_event(&StoreEvent::ActiveChanged {
            id: Some("srv-1".into()),
            origin: SelectionOrigin::Internal,
        });

        // The router reports the change the binder itself just made.
        binder.handle_url_change("/chat/srv-1").await;
        assert!(store.active_conversation_id().is_none());
    }

    #[tokio::test]
    async fn external_url_change_selects_the_conversation() {
        let (store, _navigator, binder) = binder();
        binder.handle_url_change("/chat/abc").await;
        assert_eq!(store.active_conversation_id().as_deref(), Some("abc"));

        binder.handle_url_change("/chat").await;
        assert!(store.active_conversation_id().is_none());
    }
}
