//! Application layer: the conversation store, turn orchestrator, and route
//! binder.

pub mod route;
pub mod store;

pub use route::{Navigator, RouteBinder};
pub use store::{
    ConversationStore, SelectionOrigin, SendInput, SendOutcome, StoreError, StoreEvent, TurnPhase,
};
