//! Cart store: personal carts keyed by user id, shared table carts keyed by
//! `<hotel_id>_<table_number>`. Carts are created on first add-to-cart and
//! deleted when their last item is consumed or removed.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        cart::{self, table_owner_key, Entity as CartEntity},
        cart_item::{self, Entity as CartItemEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Input for adding an item to a cart.
#[derive(Debug, Deserialize, Validate)]
pub struct AddCartItemInput {
    pub hotel_id: Option<Uuid>,
    pub table_number: Option<i32>,
    pub menu_item_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub size: Option<String>,
    #[serde(default)]
    pub addons: Vec<String>,
    pub price: Decimal,
    pub special_instructions: Option<String>,
}

/// A cart together with its line items.
#[derive(Debug, Clone)]
pub struct CartWithItems {
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Resolves the cart for this request: the shared table cart when a table
    /// is given, the personal cart otherwise. Never creates a cart — callers
    /// distinguish "no cart" from "empty order attempt". Resolving a shared
    /// cart enrolls the requesting user idempotently.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn resolve_cart(
        &self,
        user_id: Uuid,
        hotel_id: Option<Uuid>,
        table_number: Option<i32>,
    ) -> Result<CartWithItems, ServiceError> {
        let resolved = self
            .resolve_cart_on(self.db.as_ref(), user_id, hotel_id, table_number)
            .await?;

        self.event_sender
            .send_or_log(Event::CartResolved {
                cart_id: resolved.cart.id,
                user_id,
                shared: resolved.cart.is_shared(),
            })
            .await;

        Ok(resolved)
    }

    /// Connection-generic variant used inside the order-assembly transaction.
    pub async fn resolve_cart_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        hotel_id: Option<Uuid>,
        table_number: Option<i32>,
    ) -> Result<CartWithItems, ServiceError> {
        let owner_key = cart_owner_key(user_id, hotel_id, table_number)?;

        let cart = CartEntity::find()
            .filter(cart::Column::OwnerKey.eq(owner_key.clone()))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        // Enroll the requesting diner on the shared cart (set semantics).
        let cart = if cart.is_shared() && !cart.user_ids().contains(&user_id) {
            let mut users = cart.user_ids();
            users.push(user_id);
            let mut active: cart::ActiveModel = cart.into();
            active.users = Set(serde_json::json!(users));
            active.updated_at = Set(Utc::now());
            active.update(conn).await?
        } else {
            cart
        };

        let items = cart.find_related(CartItemEntity).all(conn).await?;
        Ok(CartWithItems { cart, items })
    }

    /// Adds an item, creating the cart on first add. The cart's identity is
    /// taken from the table context when present.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddCartItemInput,
    ) -> Result<CartWithItems, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if input.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Item price must be positive".to_string(),
            ));
        }
        if input.table_number.is_some() && input.hotel_id.is_none() {
            return Err(ServiceError::ValidationError(
                "hotel_id is required with table_number".to_string(),
            ));
        }

        let owner_key = cart_owner_key(user_id, input.hotel_id, input.table_number)?;
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let cart = match CartEntity::find()
            .filter(cart::Column::OwnerKey.eq(owner_key.clone()))
            .one(&txn)
            .await?
        {
            Some(existing) => existing,
            None => {
                let fresh = cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    owner_key: Set(owner_key),
                    hotel_id: Set(input.hotel_id),
                    table_number: Set(input.table_number),
                    users: Set(serde_json::json!([user_id])),
                    applied_coupon_code: Set(None),
                    discount_amount: Set(Decimal::ZERO),
                    total_amount: Set(Decimal::ZERO),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                fresh.insert(&txn).await?
            }
        };

        let item = cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            menu_item_id: Set(input.menu_item_id),
            name: Set(input.name),
            quantity: Set(input.quantity),
            size: Set(input.size),
            addons: Set(serde_json::json!(input.addons)),
            price: Set(input.price),
            ordered_by: Set(user_id),
            special_instructions: Set(input.special_instructions),
            created_at: Set(now),
            updated_at: Set(now),
        };
        item.insert(&txn).await?;

        // Enroll the adder on a shared cart they have not touched before.
        let cart = if cart.is_shared() && !cart.user_ids().contains(&user_id) {
            let mut users = cart.user_ids();
            users.push(user_id);
            let mut active: cart::ActiveModel = cart.into();
            active.users = Set(serde_json::json!(users));
            active.update(&txn).await?
        } else {
            cart
        };

        let cart = recompute_cart_total(&txn, cart).await?;
        let items = cart.find_related(CartItemEntity).all(&txn).await?;
        txn.commit().await?;

        info!(cart_id = %cart.id, "Cart item added");
        Ok(CartWithItems { cart, items })
    }

    /// Removes one item; deletes the cart entirely when it becomes empty.
    #[instrument(skip(self), fields(cart_id = %cart_id, item_id = %item_id))]
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let cart = CartEntity::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let item = CartItemEntity::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;
        if item.cart_id != cart.id {
            return Err(ServiceError::ValidationError(
                "Item does not belong to this cart".to_string(),
            ));
        }
        item.delete(&txn).await?;

        self.prune_or_delete_on(&txn, cart, &[]).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Removes the consumed item ids (nothing when the slice is empty — the
    /// caller already deleted rows), recomputes the cart total, and deletes
    /// the cart row when nothing is left. Runs on the order-assembly
    /// transaction: the order write lands first, then this prune, atomically
    /// together.
    pub async fn prune_or_delete_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: cart::Model,
        removed_item_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        let cart_id = cart.id;

        let removed = if removed_item_ids.is_empty() {
            0
        } else {
            CartItemEntity::delete_many()
                .filter(cart_item::Column::CartId.eq(cart_id))
                .filter(cart_item::Column::Id.is_in(removed_item_ids.to_vec()))
                .exec(conn)
                .await?
                .rows_affected as usize
        };

        let remaining = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(conn)
            .await?;

        let deleted = if remaining.is_empty() {
            cart.delete(conn).await?;
            true
        } else {
            recompute_cart_total(conn, cart).await?;
            false
        };

        self.event_sender
            .send_or_log(Event::CartPruned {
                cart_id,
                removed_items: removed,
                deleted,
            })
            .await;
        Ok(())
    }
}

fn cart_owner_key(
    user_id: Uuid,
    hotel_id: Option<Uuid>,
    table_number: Option<i32>,
) -> Result<String, ServiceError> {
    match (hotel_id, table_number) {
        (Some(hotel), Some(table)) => Ok(table_owner_key(hotel, table)),
        (None, Some(_)) => Err(ServiceError::ValidationError(
            "hotel_id is required with table_number".to_string(),
        )),
        _ => Ok(user_id.to_string()),
    }
}

async fn recompute_cart_total<C: ConnectionTrait>(
    conn: &C,
    cart: cart::Model,
) -> Result<cart::Model, ServiceError> {
    let items = CartItemEntity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .all(conn)
        .await?;
    let total: Decimal = items.iter().map(|item| item.price).sum();

    let mut active: cart::ActiveModel = cart.into();
    active.total_amount = Set(total);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}
