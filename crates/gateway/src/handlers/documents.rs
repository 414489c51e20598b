//! Document management handlers

use axum::extract::{
    multipart::{Multipart, MultipartError},
    Path, Query, State,
};
use serde::Deserialize;

use crate::response::{ApiResponse, DOCUMENTS_RETRIEVED, DOCUMENT_DELETED, DOCUMENT_INGESTED};
use crate::AppState;
use docqa_common::{
    db::models::Document,
    errors::{AppError, Result},
    services::IngestOutcome,
};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Pagination for the document listing
#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    #[serde(default)]
    pub skip: u64,

    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    10
}

/// Upload a PDF, embed every page and store the chunks
pub async fn ingest_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<ApiResponse<IngestOutcome>> {
    let (filename, bytes) = read_pdf_upload(&mut multipart).await?;

    tracing::info!(filename = %filename, size = bytes.len(), "Document upload received");

    let outcome = state.documents.ingest_document(&filename, bytes).await?;
    Ok(ApiResponse::success(DOCUMENT_INGESTED, outcome))
}

/// Live documents, oldest first
pub async fn list_documents(
    State(state): State<AppState>,
    Query(page): Query<ListDocumentsQuery>,
) -> Result<ApiResponse<Vec<Document>>> {
    let documents = state.documents.list_documents(page.skip, page.limit).await?;
    Ok(ApiResponse::success(DOCUMENTS_RETRIEVED, documents))
}

/// Soft delete a document
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<i32>,
) -> Result<ApiResponse<Document>> {
    let document = state.documents.delete_document(document_id).await?;
    Ok(ApiResponse::success(DOCUMENT_DELETED, document))
}

/// First file part of the form, whatever its field name
async fn read_pdf_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>)> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        if field.content_type() != Some(PDF_CONTENT_TYPE) {
            return Err(AppError::InvalidFormat {
                message: "Only PDF file is accepted.".to_string(),
            });
        }

        let bytes = field.bytes().await.map_err(upload_error)?;
        return Ok((filename, bytes.to_vec()));
    }

    Err(AppError::MissingField {
        field: "file".to_string(),
    })
}

fn upload_error(err: MultipartError) -> AppError {
    AppError::InvalidFormat {
        message: err.body_text(),
    }
}
