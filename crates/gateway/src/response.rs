//! Success envelope shared by every API endpoint

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const DOCUMENT_INGESTED: &str = "Document ingested successfully.";
pub const DOCUMENTS_RETRIEVED: &str = "Retrieved documents information successfully.";
pub const DOCUMENT_DELETED: &str = "Document deleted successfully.";
pub const SESSION_CREATED: &str = "Session created successfully.";
pub const QUESTION_ANSWERED: &str = "Question answered successfully.";
pub const CHATS_RETRIEVED: &str = "Retrieved chat history successfully.";

/// `{success, message, details}`; errors use the same shape with
/// `success: false` (see `AppError`)
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub details: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, details: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            details,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::success(SESSION_CREATED, vec![1, 2])).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Session created successfully.");
        assert_eq!(body["details"], serde_json::json!([1, 2]));
    }
}
