//! HTTP gateway to the hosted assistant.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use toolpush_core::chat::{AssistantGateway, PromptMessage};
use toolpush_core::config::Config;
use toolpush_core::error::{ApiError, Result};
use toolpush_infrastructure::ApiClient;

/// Gateway over `POST /prompt`.
///
/// The response shape is under-specified server-side: depending on the
/// deployment it is `{response}`, `{content}`, `{message}`, or a bare
/// string. `extract_reply` normalizes all of them into one reply text.
pub struct PromptGateway {
    client: Arc<ApiClient>,
    generate_timeout: Duration,
}

impl PromptGateway {
    pub fn new(client: Arc<ApiClient>, config: &Config) -> Self {
        Self {
            client,
            generate_timeout: config.generate_timeout,
        }
    }
}

#[async_trait]
impl AssistantGateway for PromptGateway {
    async fn generate(
        &self,
        messages: &[PromptMessage],
        session_id: Option<&str>,
    ) -> Result<String> {
        let mut body = json!({ "messages": messages });
        if let Some(id) = session_id {
            body["chat_id"] = json!(id);
        }

        let value = self
            .client
            .post_with_timeout("/prompt", &body, self.generate_timeout)
            .await?;

        extract_reply(&value).ok_or_else(|| {
            tracing::warn!(payload = %value, "assistant response had no recognizable text");
            ApiError::server(200, "assistant response had no recognizable text payload")
        })
    }
}

/// Normalizes the tolerated response shapes into a single reply string.
pub fn extract_reply(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map
            .get("response")
            .or_else(|| map.get("content"))
            .or_else(|| map.get("message"))
            .and_then(|v| v.as_str())?,
        _ => return None,
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_every_documented_shape() {
        assert_eq!(
            extract_reply(&json!({"response": "run the caliper log"})).as_deref(),
            Some("run the caliper log")
        );
        assert_eq!(
            extract_reply(&json!({"content": "hello"})).as_deref(),
            Some("hello")
        );
        assert_eq!(
            extract_reply(&json!({"message": "hi"})).as_deref(),
            Some("hi")
        );
        assert_eq!(extract_reply(&json!("bare reply")).as_deref(), Some("bare reply"));
    }

    #[test]
    fn prefers_response_over_other_keys() {
        let value = json!({"response": "first", "content": "second"});
        assert_eq!(extract_reply(&value).as_deref(), Some("first"));
    }

    #[test]
    fn rejects_empty_and_unrecognized_payloads() {
        assert_eq!(extract_reply(&json!({"response": "  "})), None);
        assert_eq!(extract_reply(&json!({"data": "x"})), None);
        assert_eq!(extract_reply(&json!(42)), None);
        assert_eq!(extract_reply(&json!(["a"])), None);
    }
}
