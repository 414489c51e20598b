//! Page-level chunk entity
//!
//! On Postgres `embedding` is a pgvector `vector(1536)` column. SeaORM sees it
//! as text in the pgvector literal form (`[0.1,0.2,...]`); writes cast it and
//! reads go through the partial models below so the vector is never decoded
//! as a string on Postgres.

use sea_orm::entity::prelude::*;
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "document_chunks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub document_id: i32,

    /// 1-based page index in extraction order
    pub page_number: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub embedding: String,

    /// `{usage}` for the embedding call that produced this chunk
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata_info: Json,

    pub is_deleted: bool,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl crate::db::crud::LiveEntity for Entity {
    fn id_column() -> Column {
        Column::Id
    }

    fn deleted_column() -> Column {
        Column::IsDeleted
    }
}

/// Chunk without its vector
#[derive(Clone, Debug, PartialEq, FromQueryResult, Serialize, Deserialize)]
pub struct ChunkView {
    pub id: i32,
    pub document_id: i32,
    pub page_number: i32,
    pub content: String,
    pub metadata_info: Json,
    pub created_at: DateTimeUtc,
}

/// Search hit with its cosine distance to the query (`1 - cos`)
#[derive(Clone, Debug, PartialEq, FromQueryResult, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: i32,
    pub document_id: i32,
    pub page_number: i32,
    pub content: String,
    pub distance: f64,
}

/// Chunk with the stored vector literal, used for in-process ranking
#[derive(Clone, Debug, FromQueryResult)]
pub struct ChunkVector {
    pub id: i32,
    pub document_id: i32,
    pub page_number: i32,
    pub content: String,
    pub embedding: String,
}

impl ChunkVector {
    /// Parse embedding from stored text format to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        parse_embedding(&self.embedding)
    }
}

/// Render a vector in the pgvector literal form: `[1,2.5,3]`
pub fn format_embedding(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Parse the pgvector literal form back into floats
pub fn parse_embedding(raw: &str) -> Option<Vec<f32>> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_text_form() {
        let raw = format_embedding(&[1.0, -0.5, 0.25]);
        assert_eq!(raw, "[1,-0.5,0.25]");
        assert_eq!(parse_embedding(&raw), Some(vec![1.0, -0.5, 0.25]));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_embedding("[1.0,abc]"), None);
        assert_eq!(parse_embedding("[]"), Some(vec![]));
    }
}
