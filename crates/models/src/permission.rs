use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Seeded reference data; `name` is always the canonical `resource:action` form.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "permission")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub is_system_permission: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
