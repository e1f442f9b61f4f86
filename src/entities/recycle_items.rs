use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const ITEM_FILE: &str = "file";
pub const ITEM_FOLDER: &str = "folder";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recycle_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub item_type: String, // "file" or "folder"
    pub item_id: String,
    pub original_parent_id: Option<String>,
    pub name: String,
    /// Bytes held by the item and everything below it.
    pub size: i64,
    pub deleted_at: DateTimeUtc,
    pub purge_after: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::OwnerId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Owner,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
