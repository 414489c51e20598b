//! Repository pattern for database operations
//!
//! Groups the document, chunk, session and turn stores behind one facade.
//! Single-row reads and writes go through [`crud`]; chunk persistence and
//! similarity search are specialised here.

use crate::db::crud::{self, LiveEntity};
use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Alias, Expr, Query, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};

/// Chunk waiting to be written
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub document_id: i32,
    pub page_number: i32,
    pub content: String,
    pub embedding: Vec<f32>,
    pub usage: u32,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Create a new document in PENDING state
    pub async fn create_document(
        &self,
        filename: &str,
        embedding_model: &str,
        metadata_info: serde_json::Value,
    ) -> Result<Document> {
        let document = DocumentActiveModel {
            filename: Set(filename.to_string()),
            status: Set(DocumentStatus::Pending),
            embedding_model: Set(embedding_model.to_string()),
            processing_time: Set(None),
            metadata_info: Set(metadata_info),
            is_deleted: Set(false),
            ..Default::default()
        };

        crud::create(self.write_conn(), document).await
    }

    /// Find live document by ID
    pub async fn find_document(&self, id: i32) -> Result<Option<Document>> {
        crud::find_live_by_id::<DocumentEntity, _>(self.read_conn(), id).await
    }

    /// List live documents in insertion order
    pub async fn list_documents(&self, skip: u64, limit: u64) -> Result<Vec<Document>> {
        crud::list_live::<DocumentEntity, _>(self.read_conn(), skip, limit).await
    }

    /// Mark a document COMPLETED with its processing time in seconds
    pub async fn complete_document(
        &self,
        document: Document,
        processing_time: f64,
    ) -> Result<Document> {
        let mut active: DocumentActiveModel = document.into();
        active.status = Set(DocumentStatus::Completed);
        active.processing_time = Set(Some(processing_time));

        crud::update(self.write_conn(), active).await
    }

    /// Soft-delete a document together with its chunks
    pub async fn delete_document(&self, id: i32) -> Result<Document> {
        let document = self
            .find_document(id)
            .await?
            .ok_or(AppError::DocumentNotFound { id })?;

        let txn = self.write_conn().begin().await?;
        let deleted = crud::soft_delete(&txn, DocumentActiveModel::from(document)).await?;

        let mut update = Query::update();
        update
            .table(ChunkEntity)
            .value(ChunkColumn::IsDeleted, true)
            .value(ChunkColumn::UpdatedAt, Utc::now())
            .and_where(Expr::col(ChunkColumn::DocumentId).eq(id))
            .and_where(Expr::col(ChunkColumn::IsDeleted).eq(false));

        let backend = txn.get_database_backend();
        txn.execute(backend.build(&update)).await?;
        txn.commit().await?;

        Ok(deleted)
    }

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    /// Write a batch of chunks in one transaction.
    ///
    /// Returns the `created_at` stamped on the batch. Postgres receives the
    /// vector through a `::vector` cast; other backends store the literal.
    pub async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        if chunks.is_empty() {
            return Ok(now);
        }

        let backend = self.write_conn().get_database_backend();
        let mut insert = Query::insert();
        insert.into_table(ChunkEntity).columns([
            ChunkColumn::DocumentId,
            ChunkColumn::PageNumber,
            ChunkColumn::Content,
            ChunkColumn::Embedding,
            ChunkColumn::MetadataInfo,
            ChunkColumn::IsDeleted,
            ChunkColumn::CreatedAt,
            ChunkColumn::UpdatedAt,
        ]);

        for chunk in chunks {
            let embedding = Expr::val(format_embedding(&chunk.embedding));
            let embedding: SimpleExpr = match backend {
                DbBackend::Postgres => embedding.cast_as(Alias::new("vector")),
                _ => embedding.into(),
            };

            insert
                .values([
                    Expr::val(chunk.document_id).into(),
                    Expr::val(chunk.page_number).into(),
                    Expr::val(chunk.content).into(),
                    embedding,
                    Expr::val(serde_json::json!({ "usage": chunk.usage })).into(),
                    Expr::val(false).into(),
                    Expr::val(now).into(),
                    Expr::val(now).into(),
                ])
                .map_err(|e| AppError::Internal {
                    message: format!("Failed to build chunk insert: {}", e),
                })?;
        }

        let txn = self.write_conn().begin().await?;
        txn.execute(backend.build(&insert)).await?;
        txn.commit().await?;

        Ok(now)
    }

    /// Live chunks of a document ordered by page number
    pub async fn list_chunks(&self, document_id: i32) -> Result<Vec<ChunkView>> {
        ChunkEntity::find()
            .select_only()
            .columns([
                ChunkColumn::Id,
                ChunkColumn::DocumentId,
                ChunkColumn::PageNumber,
                ChunkColumn::Content,
                ChunkColumn::MetadataInfo,
                ChunkColumn::CreatedAt,
            ])
            .filter(ChunkEntity::live())
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .order_by_asc(ChunkColumn::PageNumber)
            .order_by_asc(ChunkColumn::Id)
            .into_model::<ChunkView>()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Up to `limit` live chunks of one document, nearest first by cosine
    /// distance. Equal distances keep storage order.
    pub async fn similarity_search(
        &self,
        document_id: i32,
        query: &[f32],
        limit: u64,
    ) -> Result<Vec<ScoredChunk>> {
        match self.read_conn().get_database_backend() {
            DbBackend::Postgres => self.vector_search(document_id, query, limit).await,
            _ => self.ranked_scan(document_id, query, limit).await,
        }
    }

    /// pgvector search using the cosine distance operator
    async fn vector_search(
        &self,
        document_id: i32,
        query: &[f32],
        limit: u64,
    ) -> Result<Vec<ScoredChunk>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT
                id,
                document_id,
                page_number,
                content,
                (embedding <=> $1::vector)::float8 AS distance
            FROM document_chunks
            WHERE document_id = $2
              AND is_deleted = false
            ORDER BY distance ASC, id ASC
            LIMIT $3
            "#,
            vec![
                format_embedding(query).into(),
                document_id.into(),
                (limit as i64).into(),
            ],
        );

        ScoredChunk::find_by_statement(stmt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Rank a document's chunks in process. Used where pgvector is absent.
    async fn ranked_scan(
        &self,
        document_id: i32,
        query: &[f32],
        limit: u64,
    ) -> Result<Vec<ScoredChunk>> {
        let candidates = ChunkEntity::find()
            .select_only()
            .columns([
                ChunkColumn::Id,
                ChunkColumn::DocumentId,
                ChunkColumn::PageNumber,
                ChunkColumn::Content,
                ChunkColumn::Embedding,
            ])
            .filter(ChunkEntity::live())
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .order_by_asc(ChunkColumn::Id)
            .into_model::<ChunkVector>()
            .all(self.read_conn())
            .await?;

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let embedding = candidate.parse_embedding().ok_or_else(|| AppError::Internal {
                message: format!("Chunk {} has a malformed embedding", candidate.id),
            })?;
            scored.push(ScoredChunk {
                id: candidate.id,
                document_id: candidate.document_id,
                page_number: candidate.page_number,
                content: candidate.content,
                distance: cosine_distance(query, &embedding),
            });
        }

        // Stable: ties stay in id order
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit as usize);

        Ok(scored)
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Create a chat session bound to a document
    pub async fn create_session(
        &self,
        name: &str,
        document_id: i32,
        system_message: &str,
    ) -> Result<ChatSession> {
        let session = ChatSessionActiveModel {
            name: Set(name.to_string()),
            system_message: Set(system_message.to_string()),
            document_id: Set(document_id),
            metadata_info: Set(serde_json::json!({})),
            is_deleted: Set(false),
            ..Default::default()
        };

        crud::create(self.write_conn(), session).await
    }

    /// Find live session by ID
    pub async fn find_session(&self, id: i32) -> Result<Option<ChatSession>> {
        crud::find_live_by_id::<ChatSessionEntity, _>(self.read_conn(), id).await
    }

    // ========================================================================
    // Chat Turn Operations
    // ========================================================================

    /// Record one answered question
    pub async fn create_turn(
        &self,
        session_id: i32,
        question: &str,
        answer: &str,
        metadata_info: serde_json::Value,
    ) -> Result<ChatTurn> {
        let turn = ChatTurnActiveModel {
            session_id: Set(session_id),
            question: Set(question.to_string()),
            answer: Set(answer.to_string()),
            metadata_info: Set(metadata_info),
            is_deleted: Set(false),
            ..Default::default()
        };

        crud::create(self.write_conn(), turn).await
    }

    /// Turns of a session in the order they were asked
    pub async fn list_turns(&self, session_id: i32) -> Result<Vec<ChatTurn>> {
        crud::list_live_where::<ChatTurnEntity, _>(
            self.read_conn(),
            Condition::all().add(ChatTurnColumn::SessionId.eq(session_id)),
        )
        .await
    }
}

/// `1 - cos(a, b)`. A zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}
