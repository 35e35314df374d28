//! Answer cache entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub paper_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub question: String,

    /// Fingerprint of the normalized question; unique per paper
    #[sea_orm(column_type = "Text")]
    pub question_hash: String,

    #[sea_orm(column_type = "Text")]
    pub answer: String,

    /// Evidence chunk ids as a JSON array, in similarity order
    #[sea_orm(column_type = "JsonBinary")]
    pub context_chunk_ids: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub model_used: Option<String>,

    pub tokens_used: Option<i32>,

    pub hit_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub last_accessed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::PaperId",
        to = "super::paper::Column::Id",
        on_delete = "Cascade"
    )]
    Paper,
}

impl Related<super::paper::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Paper.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Evidence chunk ids, skipping anything that is not a UUID string
    pub fn chunk_ids(&self) -> Vec<Uuid> {
        self.context_chunk_ids
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}
