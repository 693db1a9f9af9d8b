use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit log for membership consumption. Rows are never updated
/// or reordered; readers sort by `created_at`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "membership_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub membership_id: Uuid,
    pub action: HistoryAction,
    pub meals_changed: i32,
    pub consumed_meals: i32,
    pub remaining_meals: i32,
    pub meal_type: String,
    #[sea_orm(nullable)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user_membership::Entity",
        from = "Column::MembershipId",
        to = "super::user_membership::Column::Id"
    )]
    Membership,
}

impl Related<super::user_membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Membership.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "consumed")]
    Consumed,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "hold")]
    Hold,
    #[sea_orm(string_value = "resumed")]
    Resumed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}
