//! Question answering over a single document
//!
//! A chat session is bound to one document at creation. Each question is
//! embedded, matched against that document's chunks only, and answered by
//! the completion gateway. A turn is written only once an answer exists.

use crate::completion::{ChatModel, Completer, CompletionRequest};
use crate::db::models::{ChatSession, ChatTurn, ScoredChunk};
use crate::db::Repository;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Question as asked by a client
#[derive(Debug, Clone)]
pub struct Question {
    pub text: String,
    pub model: Option<ChatModel>,
    pub max_tokens: Option<u32>,
}

/// Stored on every chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub chat_completion_id: String,
    /// Embedding tokens for the question plus completion tokens for the answer
    pub usage: u32,
    pub model: ChatModel,
}

/// Result of answering a question
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub session_id: i32,
    pub question: String,
    pub answer: String,
    pub metadata_info: TurnMetadata,
    pub chat_id: i32,
    pub created_at: DateTime<Utc>,
}

pub struct ChatService {
    repo: Repository,
    embedder: Arc<dyn Embedder>,
    completer: Arc<dyn Completer>,
    top_k: u64,
    default_model: ChatModel,
    default_max_tokens: u32,
}

impl ChatService {
    pub fn new(
        repo: Repository,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        top_k: u64,
    ) -> Self {
        Self {
            repo,
            embedder,
            completer,
            top_k,
            default_model: ChatModel::default(),
            default_max_tokens: 300,
        }
    }

    /// Model and answer budget used when a question leaves them out
    pub fn with_defaults(mut self, model: ChatModel, max_tokens: u32) -> Self {
        self.default_model = model;
        self.default_max_tokens = max_tokens;
        self
    }

    /// Open a session on a live document
    #[instrument(skip(self, system_message))]
    pub async fn create_session(
        &self,
        name: &str,
        document_id: i32,
        system_message: &str,
    ) -> Result<ChatSession> {
        if self.repo.find_document(document_id).await?.is_none() {
            return Err(AppError::DocumentNotFound { id: document_id });
        }

        let session = self
            .repo
            .create_session(name, document_id, system_message)
            .await?;

        tracing::info!(session_id = session.id, document_id, "Session created");
        Ok(session)
    }

    /// Answer a question against the session's document
    #[instrument(skip(self, question), fields(model))]
    pub async fn ask(&self, session_id: i32, question: Question) -> Result<AnswerOutcome> {
        let session = self
            .repo
            .find_session(session_id)
            .await?
            .ok_or(AppError::SessionNotFound { id: session_id })?;

        if self.repo.find_document(session.document_id).await?.is_none() {
            return Err(AppError::DocumentNotFound {
                id: session.document_id,
            });
        }

        let model = question.model.unwrap_or(self.default_model);
        let max_tokens = question.max_tokens.unwrap_or(self.default_max_tokens);
        tracing::Span::current().record("model", model.as_str());

        let embedding = self.embedder.embed(&question.text).await?;
        let hits = self
            .repo
            .similarity_search(session.document_id, &embedding.vector, self.top_k)
            .await?;

        tracing::debug!(
            session_id,
            document_id = session.document_id,
            hits = hits.len(),
            "Context retrieved"
        );

        let completion = self
            .completer
            .complete(CompletionRequest {
                system_message: session.system_message.clone(),
                question: question.text.clone(),
                context: build_context(&hits),
                max_tokens,
                model,
            })
            .await?;

        let metadata = TurnMetadata {
            chat_completion_id: completion.completion_id,
            usage: embedding.usage + completion.usage,
            model,
        };

        let turn = self
            .repo
            .create_turn(
                session.id,
                &question.text,
                &completion.answer,
                serde_json::to_value(&metadata)?,
            )
            .await?;

        metrics::record_question(model.as_str(), embedding.usage, completion.usage);
        tracing::info!(
            session_id,
            chat_id = turn.id,
            usage = metadata.usage,
            "Question answered"
        );

        Ok(AnswerOutcome {
            session_id: session.id,
            question: turn.question,
            answer: turn.answer,
            metadata_info: metadata,
            chat_id: turn.id,
            created_at: turn.created_at,
        })
    }

    /// Turns of a live session in the order they were asked
    pub async fn history(&self, session_id: i32) -> Result<Vec<ChatTurn>> {
        if self.repo.find_session(session_id).await?.is_none() {
            return Err(AppError::SessionNotFound { id: session_id });
        }
        self.repo.list_turns(session_id).await
    }
}

/// Join hits in rank order as `"{content} page_number {page}"`, separated by
/// a blank line
pub fn build_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| format!("{} page_number {}", hit.content, hit.page_number))
        .collect::<Vec<_>>()
        .join("\n\n")
}
