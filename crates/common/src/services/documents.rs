//! Document ingestion service
//!
//! Handles the ingestion workflow:
//! 1. Extract page texts from the PDF
//! 2. Create the document record in PENDING
//! 3. Embed every page in order, buffering chunks
//! 4. Flush the buffer in batches, one transaction per batch
//! 5. Mark the document COMPLETED with its processing time

use crate::db::models::Document;
use crate::db::{NewChunk, Repository};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::{metrics, pdf};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Audit metadata stored on the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Whole kilobytes, e.g. `"12 KB"`
    pub size: String,
    pub pages: usize,
    /// Hex digest of the uploaded file
    pub md5: String,
}

impl DocumentMetadata {
    pub fn describe(bytes: &[u8], pages: usize) -> Self {
        Self {
            size: format!("{} KB", bytes.len() / 1024),
            pages,
            md5: hex::encode(Md5::digest(bytes)),
        }
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub id: i32,
    pub filename: String,
    pub metadata_info: serde_json::Value,
    /// Embedding tokens across all pages
    pub usage: u32,
}

pub struct DocumentService {
    repo: Repository,
    embedder: Arc<dyn Embedder>,
    flush_threshold: usize,
}

impl DocumentService {
    pub fn new(repo: Repository, embedder: Arc<dyn Embedder>, flush_threshold: usize) -> Self {
        Self {
            repo,
            embedder,
            flush_threshold,
        }
    }

    /// Ingest an uploaded PDF
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn ingest_document(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestOutcome> {
        if !pdf::has_pdf_signature(&bytes) {
            return Err(AppError::PdfParse {
                message: "missing %PDF- header".to_string(),
            });
        }

        let (pages, bytes) = tokio::task::spawn_blocking(move || {
            let pages = pdf::extract_pages(&bytes);
            (pages, bytes)
        })
        .await?;
        let pages = pages?;

        let metadata = DocumentMetadata::describe(&bytes, pages.len());
        self.ingest_pages(filename, metadata, pages).await
    }

    /// Embed and store already extracted pages. `pages[i]` becomes page `i + 1`.
    #[instrument(skip(self, metadata, pages), fields(pages = pages.len()))]
    pub async fn ingest_pages(
        &self,
        filename: &str,
        metadata: DocumentMetadata,
        pages: Vec<String>,
    ) -> Result<IngestOutcome> {
        let start = Instant::now();

        let document = self
            .repo
            .create_document(
                filename,
                self.embedder.model_name(),
                serde_json::to_value(&metadata)?,
            )
            .await?;

        tracing::info!(document_id = document.id, filename, "Document created, embedding pages");

        let mut buffer: Vec<NewChunk> = Vec::with_capacity(self.flush_threshold + 1);
        let mut total_usage: u32 = 0;
        let mut chunk_count = 0usize;
        let mut last_persisted: Option<DateTime<Utc>> = None;

        for (index, content) in pages.into_iter().enumerate() {
            let embedding = self.embedder.embed(&content).await?;
            total_usage += embedding.usage;

            buffer.push(NewChunk {
                document_id: document.id,
                page_number: (index + 1) as i32,
                content,
                embedding: embedding.vector,
                usage: embedding.usage,
            });

            if buffer.len() > self.flush_threshold {
                chunk_count += buffer.len();
                last_persisted = Some(self.flush(document.id, &mut buffer).await?);
            }
        }

        if !buffer.is_empty() {
            chunk_count += buffer.len();
            last_persisted = Some(self.flush(document.id, &mut buffer).await?);
        }

        let finished_at = last_persisted.unwrap_or_else(Utc::now);
        let document = self
            .repo
            .complete_document(document.clone(), processing_seconds(&document, finished_at))
            .await?;

        let duration = start.elapsed();
        metrics::record_ingestion(duration.as_secs_f64(), chunk_count, total_usage);

        tracing::info!(
            document_id = document.id,
            chunks = chunk_count,
            usage = total_usage,
            processing_time = ?document.processing_time,
            total_ms = duration.as_millis() as u64,
            "Document ingested successfully"
        );

        Ok(IngestOutcome {
            id: document.id,
            filename: document.filename,
            metadata_info: document.metadata_info,
            usage: total_usage,
        })
    }

    async fn flush(&self, document_id: i32, buffer: &mut Vec<NewChunk>) -> Result<DateTime<Utc>> {
        let batch = std::mem::take(buffer);
        let size = batch.len();
        let persisted_at = self.repo.insert_chunks(batch).await?;
        tracing::debug!(document_id, batch = size, "Chunk batch committed");
        Ok(persisted_at)
    }

    /// Live documents in insertion order
    pub async fn list_documents(&self, skip: u64, limit: u64) -> Result<Vec<Document>> {
        self.repo.list_documents(skip, limit).await
    }

    /// Soft-delete a document
    pub async fn delete_document(&self, id: i32) -> Result<Document> {
        let document = self.repo.delete_document(id).await?;
        tracing::info!(document_id = id, "Document deleted");
        Ok(document)
    }

    /// Fail with `DocumentNotFound` unless the document is live
    pub async fn require_document(&self, id: i32) -> Result<Document> {
        self.repo
            .find_document(id)
            .await?
            .ok_or(AppError::DocumentNotFound { id })
    }
}

fn processing_seconds(document: &Document, finished_at: DateTime<Utc>) -> f64 {
    let elapsed = finished_at.signed_duration_since(document.created_at);
    (elapsed.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DocumentStatus;
    use crate::embeddings::{Embedding, MockEmbedder};
    use crate::test_support::{build_pdf, memory_pool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn service(embedder: Arc<dyn Embedder>) -> (DocumentService, Repository) {
        let repo = Repository::new(memory_pool().await);
        (DocumentService::new(repo.clone(), embedder, 10), repo)
    }

    fn pages(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("contents of page {}", i)).collect()
    }

    fn metadata(pages: usize) -> DocumentMetadata {
        DocumentMetadata::describe(b"%PDF-1.5", pages)
    }

    /// Fails on the n-th call (1-based), succeeds otherwise
    struct FailingEmbedder {
        fail_on: usize,
        calls: AtomicUsize,
        inner: MockEmbedder,
    }

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, text: &str) -> Result<Embedding> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(AppError::EmbeddingError {
                    message: "upstream unavailable".into(),
                });
            }
            self.inner.embed(text).await
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[test]
    fn test_metadata_description() {
        let bytes = vec![0u8; 5000];
        let meta = DocumentMetadata::describe(&bytes, 3);
        assert_eq!(meta.size, "4 KB");
        assert_eq!(meta.pages, 3);
        assert_eq!(meta.md5.len(), 32);
        assert_eq!(
            DocumentMetadata::describe(b"", 0).md5,
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[tokio::test]
    async fn test_five_page_ingest() {
        let (service, repo) = service(Arc::new(MockEmbedder::new(32))).await;

        let outcome = service
            .ingest_pages("handbook.pdf", metadata(5), pages(5))
            .await
            .unwrap();

        // "contents of page N" is four words per page
        assert_eq!(outcome.usage, 20);
        assert_eq!(outcome.filename, "handbook.pdf");
        assert_eq!(outcome.metadata_info["pages"], 5);

        let chunks = repo.list_chunks(outcome.id).await.unwrap();
        assert_eq!(
            chunks.iter().map(|c| c.page_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(chunks[2].content, "contents of page 3");
        assert_eq!(chunks[0].metadata_info, serde_json::json!({"usage": 4}));

        let document = repo.find_document(outcome.id).await.unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert_eq!(document.embedding_model, "text-embedding-3-small");
        assert!(document.processing_time.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_batches_cover_every_page() {
        let (service, repo) = service(Arc::new(MockEmbedder::new(32))).await;

        // 11 pages flush once past the threshold, 25 pages leave a remainder
        for count in [11, 25] {
            let outcome = service
                .ingest_pages("big.pdf", metadata(count), pages(count))
                .await
                .unwrap();
            let chunks = repo.list_chunks(outcome.id).await.unwrap();
            assert_eq!(
                chunks.iter().map(|c| c.page_number).collect::<Vec<_>>(),
                (1..=count as i32).collect::<Vec<_>>()
            );
        }
    }

    #[tokio::test]
    async fn test_zero_page_document_completes() {
        let (service, repo) = service(Arc::new(MockEmbedder::new(32))).await;

        let outcome = service
            .ingest_document("blank.pdf", build_pdf(&[]))
            .await
            .unwrap();
        assert_eq!(outcome.usage, 0);
        assert_eq!(outcome.metadata_info["pages"], 0);

        let document = repo.find_document(outcome.id).await.unwrap().unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert!(document.processing_time.is_some());
        assert!(repo.list_chunks(outcome.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_pdf_bytes() {
        let (service, repo) = service(Arc::new(MockEmbedder::new(32))).await;

        let outcome = service
            .ingest_document("two.pdf", build_pdf(&["Alpha", "Beta"]))
            .await
            .unwrap();

        let chunks = repo.list_chunks(outcome.id).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].page_number, 2);
        assert_eq!(outcome.metadata_info["md5"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_creates_nothing() {
        let (service, repo) = service(Arc::new(MockEmbedder::new(32))).await;

        let err = service
            .ingest_document("fake.pdf", b"not a pdf at all".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PdfParse { .. }));
        assert!(repo.list_documents(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_document_pending() {
        let embedder = FailingEmbedder {
            fail_on: 13,
            calls: AtomicUsize::new(0),
            inner: MockEmbedder::new(32),
        };
        let (service, repo) = service(Arc::new(embedder)).await;

        let err = service
            .ingest_pages("partial.pdf", metadata(20), pages(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmbeddingError { .. }));

        let document = repo.list_documents(0, 10).await.unwrap().remove(0);
        assert_eq!(document.status, DocumentStatus::Pending);
        assert!(document.processing_time.is_none());

        // The first batch of 11 was committed before the failure
        assert_eq!(repo.list_chunks(document.id).await.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_list_and_delete_documents() {
        let (service, _) = service(Arc::new(MockEmbedder::new(32))).await;
        let first = service.ingest_pages("a.pdf", metadata(1), pages(1)).await.unwrap();
        service.ingest_pages("b.pdf", metadata(1), pages(1)).await.unwrap();

        assert_eq!(service.list_documents(0, 10).await.unwrap().len(), 2);

        service.delete_document(first.id).await.unwrap();
        let remaining = service.list_documents(0, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].filename, "b.pdf");
        assert!(matches!(
            service.require_document(first.id).await,
            Err(AppError::DocumentNotFound { .. })
        ));
    }
}
