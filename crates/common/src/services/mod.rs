//! Ingestion and question-answering pipelines

pub mod chat;
pub mod documents;

pub use chat::{build_context, AnswerOutcome, ChatService, Question, TurnMetadata};
pub use documents::{DocumentMetadata, DocumentService, IngestOutcome};
