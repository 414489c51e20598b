//! Chat session entity, bound to a single document

use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// Stored as given. The grounding instruction is added per question.
    #[sea_orm(column_type = "Text")]
    pub system_message: String,

    pub document_id: i32,

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
        to = "super::document::Column::Id"
    )]
    Document,

    #[sea_orm(has_many = "super::chat_turn::Entity")]
    Turns,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl Related<super::chat_turn::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Turns.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();
        if insert && self.created_at.is_not_set() {
            self.created_at = Set(now);
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}

impl crate::db::crud::LiveEntity for Entity {
    fn id_column() -> Column {
        Column::Id
    }

    fn deleted_column() -> Column {
        Column::IsDeleted
    }
}
