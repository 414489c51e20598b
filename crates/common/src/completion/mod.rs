//! Chat-completion gateway
//!
//! Turns a question plus retrieved context into a grounded answer. The
//! session's system message is extended with [`GROUNDING_INSTRUCTION`] on
//! every call; the stored session is never modified.

use crate::config::CompletionConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Appended to the session's system message before each completion
pub const GROUNDING_INSTRUCTION: &str = "If data is found inside the document also mention the page number from which the response is provided. In case relevant data is not found. Say 'Document doesn't contain enough data.'";

/// Chat models a question may be answered with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatModel {
    #[default]
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-3.5-turbo-0125")]
    Gpt35Turbo0125,
    #[serde(rename = "gpt-4")]
    Gpt4,
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "gpt-4-1106-preview")]
    Gpt41106Preview,
    #[serde(rename = "gpt-4-0125-preview")]
    Gpt40125Preview,
}

impl ChatModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatModel::Gpt35Turbo => "gpt-3.5-turbo",
            ChatModel::Gpt35Turbo0125 => "gpt-3.5-turbo-0125",
            ChatModel::Gpt4 => "gpt-4",
            ChatModel::Gpt4Turbo => "gpt-4-turbo",
            ChatModel::Gpt41106Preview => "gpt-4-1106-preview",
            ChatModel::Gpt40125Preview => "gpt-4-0125-preview",
        }
    }
}

impl std::fmt::Display for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed for one completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The session's own system message, without the grounding instruction
    pub system_message: String,
    pub question: String,
    pub context: String,
    pub max_tokens: u32,
    pub model: ChatModel,
}

impl CompletionRequest {
    /// System message as sent to the model
    pub fn system_prompt(&self) -> String {
        format!("{}{}", self.system_message, GROUNDING_INSTRUCTION)
    }

    /// User message as sent to the model
    pub fn user_prompt(&self) -> String {
        format!("Context:\n{}\n\nQuestion: {}", self.context, self.question)
    }
}

/// Answer returned by the completion service
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub answer: String,
    pub completion_id: String,
    /// Completion tokens billed for the answer
    pub usage: u32,
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// OpenAI compatible `/chat/completions` client
pub struct OpenAICompleter {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    id: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    completion_tokens: u32,
}

impl OpenAICompleter {
    pub fn new(api_key: String, config: &CompletionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base = config
            .api_base
            .as_deref()
            .unwrap_or(crate::DEFAULT_OPENAI_BASE)
            .trim_end_matches('/');

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base),
        })
    }

    async fn call(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = ChatRequest {
            model: request.model.as_str(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt(),
                },
            ],
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::CompletionError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::CompletionError {
                message: format!("API error {}: {}", status, text),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::CompletionError {
            message: format!("Failed to parse response: {}", e),
        })?;

        let answer = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::CompletionError {
                message: "Response contained no answer".to_string(),
            })?;

        Ok(Completion {
            answer,
            completion_id: result.id,
            usage: result.usage.completion_tokens,
        })
    }
}

#[async_trait]
impl Completer for OpenAICompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let start = Instant::now();
        let result = self.call(&request).await;
        metrics::record_completion(
            start.elapsed().as_secs_f64(),
            request.model.as_str(),
            result.is_ok(),
        );
        result
    }
}

/// Offline completer for development and tests.
///
/// Answers with the first line of the best matching context entry, or the
/// not-enough-data reply when no context was retrieved.
#[derive(Default)]
pub struct MockCompleter {
    calls: AtomicU64,
}

impl MockCompleter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Completer for MockCompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;

        let answer = match request.context.split("\n\n").next().filter(|c| !c.trim().is_empty()) {
            Some(best) => format!("According to the document: {}", best.trim()),
            None => "Document doesn't contain enough data.".to_string(),
        };
        let usage = (answer.split_whitespace().count() as u32).min(request.max_tokens);

        Ok(Completion {
            answer,
            completion_id: format!("chatcmpl-mock-{}", call),
            usage,
        })
    }
}

/// Create a completer based on configuration
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn Completer>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "OpenAI API key required for completions".to_string(),
                })?;
            Ok(Arc::new(OpenAICompleter::new(key, config)?))
        }
        "mock" => Ok(Arc::new(MockCompleter::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown completion provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(system_message: &str, context: &str) -> CompletionRequest {
        CompletionRequest {
            system_message: system_message.to_string(),
            question: "What is the refund window?".to_string(),
            context: context.to_string(),
            max_tokens: 300,
            model: ChatModel::default(),
        }
    }

    #[test]
    fn test_system_prompt_appends_grounding() {
        let req = request("You are a helpful assistant.", "");
        assert_eq!(
            req.system_prompt(),
            format!("You are a helpful assistant.{}", GROUNDING_INSTRUCTION)
        );

        // appended verbatim, trailing whitespace included
        let req = request("Be brief. ", "");
        assert!(req.system_prompt().starts_with("Be brief. If data is found"));

        let req = request("", "");
        assert_eq!(req.system_prompt(), GROUNDING_INSTRUCTION);
    }

    #[test]
    fn test_user_prompt_layout() {
        let req = request("", "Refunds within 30 days page_number 2");
        assert_eq!(
            req.user_prompt(),
            "Context:\nRefunds within 30 days page_number 2\n\nQuestion: What is the refund window?"
        );
    }

    #[test]
    fn test_model_names_round_trip_through_serde() {
        let model: ChatModel = serde_json::from_str("\"gpt-4-0125-preview\"").unwrap();
        assert_eq!(model, ChatModel::Gpt40125Preview);
        assert_eq!(serde_json::to_string(&ChatModel::Gpt35Turbo).unwrap(), "\"gpt-3.5-turbo\"");
        assert!(serde_json::from_str::<ChatModel>("\"gpt-5\"").is_err());
    }

    #[tokio::test]
    async fn test_mock_completer_uses_best_context() {
        let completer = MockCompleter::new();
        let first = completer
            .complete(request("", "Refunds within 30 days page_number 2\n\nOther page_number 5"))
            .await
            .unwrap();
        assert_eq!(
            first.answer,
            "According to the document: Refunds within 30 days page_number 2"
        );
        assert_eq!(first.completion_id, "chatcmpl-mock-1");
        assert!(first.usage > 0);

        let second = completer.complete(request("", "")).await.unwrap();
        assert_eq!(second.answer, "Document doesn't contain enough data.");
        assert_eq!(second.completion_id, "chatcmpl-mock-2");
    }
}
