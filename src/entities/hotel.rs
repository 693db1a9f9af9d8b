use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hotel record. Catalog and configuration live in an external admin system;
/// only the rate configuration matters to order assembly.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "hotels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// CGST percentage (e.g. 2.5 for 2.5%)
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cgst_rate: Decimal,
    /// SGST percentage
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub sgst_rate: Decimal,
    /// Service charge percentage
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub service_charge_rate: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::dining_table::Entity")]
    DiningTables,
}

impl Related<super::dining_table::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiningTables.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
