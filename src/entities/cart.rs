use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dine-in cart. `owner_key` is either a user id (personal cart) or
/// `<hotel_id>_<table_number>` (shared table cart, editable by every diner
/// seated there). `users` records every diner who has touched the cart.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub owner_key: String,
    #[sea_orm(nullable)]
    pub hotel_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub table_number: Option<i32>,
    #[sea_orm(column_type = "Json")]
    pub users: Json,
    #[sea_orm(nullable)]
    pub applied_coupon_code: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Diners recorded on this cart (set semantics).
    pub fn user_ids(&self) -> Vec<Uuid> {
        serde_json::from_value(self.users.clone()).unwrap_or_default()
    }

    pub fn is_shared(&self) -> bool {
        self.table_number.is_some()
    }
}

/// Builds the shared-cart identity for a table.
pub fn table_owner_key(hotel_id: Uuid, table_number: i32) -> String {
    format!("{}_{}", hotel_id, table_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_owner_key_format() {
        let hotel_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            table_owner_key(hotel_id, 7),
            "550e8400-e29b-41d4-a716-446655440000_7"
        );
    }
}
