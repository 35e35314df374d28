//! Paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub arxiv_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub abstract_text: Option<String>,

    /// Ordered author names as a JSON array
    #[sea_orm(column_type = "JsonBinary")]
    pub authors: Json,

    #[sea_orm(column_type = "JsonBinary")]
    pub categories: Json,

    /// Outgoing reference arXiv ids, in stored order
    #[sea_orm(column_type = "JsonBinary")]
    pub references: Json,

    /// Incoming citing arXiv ids, in stored order
    #[sea_orm(column_type = "JsonBinary")]
    pub cited_by: Json,

    pub published_date: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pdf_url: Option<String>,

    pub is_processed: bool,

    pub chunk_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,

    #[sea_orm(has_many = "super::chat_cache::Entity")]
    CacheEntries,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl Related<super::chat_cache::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CacheEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

fn string_list(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

impl Model {
    pub fn authors(&self) -> Vec<String> {
        string_list(&self.authors)
    }

    pub fn categories(&self) -> Vec<String> {
        string_list(&self.categories)
    }

    pub fn references(&self) -> Vec<String> {
        string_list(&self.references)
    }

    pub fn cited_by(&self) -> Vec<String> {
        string_list(&self.cited_by)
    }

    /// Publication year, if the date is known
    pub fn year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.published_date.map(|d| d.year())
    }
}
