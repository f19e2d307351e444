//! Indexed scheme document entity
//!
//! The `embedding` column is pgvector and is only touched through sqlx,
//! so it is not mapped here.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "schemes")]
pub struct Model {
    /// `scheme_{index}`
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    pub scheme_index: i32,

    #[sea_orm(column_type = "Text")]
    pub scheme_name: String,

    #[sea_orm(column_type = "Text")]
    pub department: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub embedding_model: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
