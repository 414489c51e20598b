//! SeaORM entity models
//!
//! Every table carries `metadata_info`, `is_deleted`, `created_at` and
//! `updated_at`. Timestamps are stamped in `before_save`, except for chunks
//! which are bulk inserted with explicit timestamps.

mod chat_session;
mod chat_turn;
mod document;
mod document_chunk;

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    DocumentStatus,
};

pub use document_chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
    ChunkVector,
    ChunkView,
    ScoredChunk,
    format_embedding,
    parse_embedding,
};

pub use chat_session::{
    Entity as ChatSessionEntity,
    Model as ChatSession,
    ActiveModel as ChatSessionActiveModel,
    Column as ChatSessionColumn,
};

pub use chat_turn::{
    Entity as ChatTurnEntity,
    Model as ChatTurn,
    ActiveModel as ChatTurnActiveModel,
    Column as ChatTurnColumn,
};
