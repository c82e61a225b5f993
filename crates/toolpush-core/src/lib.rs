//! Core domain layer for the Toolpush client.
//!
//! Holds the chat data model, the error taxonomy, configuration, the
//! authenticated-identity handle, and the traits the outer layers implement
//! (session repository, assistant gateway). No I/O lives here.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;

pub use auth::{AuthHandle, AuthSession, TokenProvider};
pub use config::Config;
pub use error::ApiError;
