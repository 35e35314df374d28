//! Passage chunk entity
//!
//! The `embedding vector(768)` column is not mapped here. It is written and
//! queried through raw SQL with `pgvector` types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "paper_chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub paper_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub chunk_index: i32,

    pub page_number: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub section_title: Option<String>,

    /// Token count for context budgeting
    pub token_count: Option<i32>,

    pub created_at: DateTimeWithTimeZone,
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
