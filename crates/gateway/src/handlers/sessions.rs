//! Chat session handlers

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::extract::ValidatedJson;
use crate::response::{ApiResponse, CHATS_RETRIEVED, QUESTION_ANSWERED, SESSION_CREATED};
use crate::AppState;
use docqa_common::{
    completion::ChatModel,
    db::models::ChatTurn,
    errors::Result,
    services::{AnswerOutcome, Question},
};

/// Create session request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub name: String,

    pub document_id: i32,

    #[serde(default)]
    pub system_message: String,
}

/// Create session response
#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: i32,
}

/// Question request
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub question: String,

    #[serde(default)]
    pub model: Option<ChatModel>,

    #[validate(range(min = 1, max = 4096, message = "must be between 1 and 4096"))]
    pub max_tokens: Option<u32>,
}

/// Open a session bound to one document
pub async fn create_session(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateSessionRequest>,
) -> Result<ApiResponse<SessionCreated>> {
    let session = state
        .chat
        .create_session(&request.name, request.document_id, &request.system_message)
        .await?;

    Ok(ApiResponse::success(
        SESSION_CREATED,
        SessionCreated {
            session_id: session.id,
        },
    ))
}

/// Answer a question from the session's document
pub async fn ask_question(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
    ValidatedJson(request): ValidatedJson<QuestionRequest>,
) -> Result<ApiResponse<AnswerOutcome>> {
    let outcome = state
        .chat
        .ask(
            session_id,
            Question {
                text: request.question,
                model: request.model,
                max_tokens: request.max_tokens,
            },
        )
        .await?;

    Ok(ApiResponse::success(QUESTION_ANSWERED, outcome))
}

/// Turns of a session in the order they were asked
pub async fn list_chats(
    State(state): State<AppState>,
    Path(session_id): Path<i32>,
) -> Result<ApiResponse<Vec<ChatTurn>>> {
    let turns = state.chat.history(session_id).await?;
    Ok(ApiResponse::success(CHATS_RETRIEVED, turns))
}
