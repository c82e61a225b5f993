//! Infrastructure layer: HTTP transport and the remote session repository.

pub mod http_session_repository;
pub mod transport;

pub use http_session_repository::HttpSessionRepository;
pub use transport::ApiClient;
