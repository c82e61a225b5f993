//! Interaction layer: the gateway that turns a prompt log into one
//! assistant reply.

pub mod prompt_gateway;

pub use prompt_gateway::PromptGateway;
