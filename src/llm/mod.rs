//! LLM 모듈 - OpenAI Chat Completions
//!
//! 대화 메시지 타입과 채팅 프로바이더 트레이트를 정의합니다.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::openai::OpenAiClient;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 대화 메시지 (`{role, content}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// ChatProvider Trait
// ============================================================================

/// 채팅 완성 프로바이더
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 메시지 목록으로 한 번의 완성 요청, 모델 텍스트 반환
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 채팅 구현체
///
/// ref: https://platform.openai.com/docs/api-reference/chat
#[derive(Clone)]
pub struct OpenAiChat {
    client: OpenAiClient,
    model: String,
}

impl OpenAiChat {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        Ok(Self::from_client(OpenAiClient::new(config)?))
    }

    pub fn from_client(client: OpenAiClient) -> Self {
        let model = client.config().chat_model.clone();
        Self { client, model }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let response: CompletionResponse = self
            .client
            .post_json("chat/completions", &request)
            .await
            .context("Chat completion request failed")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!("Chat completion returned {} chars", content.len());
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::tests::{spawn_mock, test_config};

    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, json!({"role": "assistant", "content": "hi"}));

        let parsed: ChatMessage =
            serde_json::from_value(json!({"role": "user", "content": "q"})).unwrap();
        assert_eq!(parsed, ChatMessage::user("q"));
    }

    #[tokio::test]
    async fn test_complete_sends_model_and_messages() {
        // 요청 본문을 그대로 요약해서 돌려주는 mock
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                let summary = format!(
                    "{}|{}|{}|{}",
                    body["model"].as_str().unwrap_or(""),
                    body["messages"].as_array().map(|m| m.len()).unwrap_or(0),
                    body["messages"][0]["role"].as_str().unwrap_or(""),
                    body["temperature"].as_f64().unwrap_or(-1.0),
                );
                Json(json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": summary}}]
                }))
            }),
        );
        let base = spawn_mock(router).await;
        let chat = OpenAiChat::new(&test_config(base)).unwrap();

        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("q")];
        let text = chat.complete(&messages, 0.5).await.unwrap();

        assert_eq!(text, "gpt-4o-mini|2|system|0.5");
        assert_eq!(chat.name(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_complete_without_choices_is_empty() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = spawn_mock(router).await;
        let chat = OpenAiChat::new(&test_config(base)).unwrap();

        assert_eq!(chat.complete(&[ChatMessage::user("q")], 0.1).await.unwrap(), "");
    }
}
