//! Order assembler and lifecycle. Turns a (possibly shared) cart into the
//! table's single canonical order: either a fresh order or a merge into the
//! table's active order, with taxes recomputed on the cumulative subtotal
//! and the paid amount derived from the ledger.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        cart_item,
        hotel::{self, Entity as HotelEntity},
        order::{self, Entity as OrderEntity, OrderStatus, PaymentMethod, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity, ItemPaymentStatus, ItemStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::{CartService, CartWithItems},
        charges::{compute_charges, compute_total, RateCard},
        coupons::CouponService,
        payments::{derive_payment_status, recompute_amount_paid},
        tables::TableService,
    },
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub hotel_id: Option<Uuid>,
    pub table_number: Option<i32>,
    pub payment_method: PaymentMethod,
    /// Cart item ids to consume; absent means the whole cart.
    pub selected_item_ids: Option<Vec<Uuid>>,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub hotel_id: Option<Uuid>,
    pub table_number: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct OrderListSummary {
    pub count: u64,
    pub total_amount: Decimal,
}

/// Outcome of `create_order`: the canonical order plus whether this request
/// merged into an existing active table order.
#[derive(Debug)]
pub struct AssembledOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub merged: bool,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    carts: CartService,
    tables: TableService,
    coupons: CouponService,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        carts: CartService,
        tables: TableService,
        coupons: CouponService,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
            tables,
            coupons,
        }
    }

    /// Creates the canonical order for this request. With a table context the
    /// active-order slot decides between "create" and "merge"; the slot claim
    /// is conditional, and a lost claim retries into the merge path, so two
    /// concurrent requests for the same table produce exactly one order.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<AssembledOrder, ServiceError> {
        let hotel_id = request.hotel_id.ok_or_else(|| {
            ServiceError::ValidationError("hotel_id is required".to_string())
        })?;

        let hotel = HotelEntity::find_by_id(hotel_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Hotel not found".to_string()))?;
        let rates = RateCard::from(&hotel);

        let txn = self.db.begin().await?;

        let resolved = self
            .carts
            .resolve_cart_on(&txn, user_id, Some(hotel_id), request.table_number)
            .await?;
        if resolved.items.is_empty() {
            return Err(ServiceError::BusinessRule("Cart is empty".to_string()));
        }

        let selected = select_items(&resolved.items, request.selected_item_ids.as_deref())?;
        let selected_ids: Vec<Uuid> = selected.iter().map(|item| item.id).collect();
        let selected_subtotal: Decimal = selected.iter().map(|item| item.price).sum();

        let assembled = match request.table_number {
            Some(table_number) => {
                // Make sure the table exists before touching its slot.
                self.tables.find_table(&txn, hotel_id, table_number).await?;
                self.assemble_for_table(
                    &txn,
                    user_id,
                    &hotel,
                    &rates,
                    table_number,
                    &resolved,
                    &selected,
                    selected_subtotal,
                    request.payment_method,
                    request.special_instructions.as_deref(),
                )
                .await?
            }
            None => {
                let order = self
                    .insert_new_order(
                        &txn,
                        user_id,
                        &hotel,
                        &rates,
                        None,
                        &resolved,
                        &selected,
                        selected_subtotal,
                        request.payment_method,
                        request.special_instructions.as_deref(),
                    )
                    .await?;
                AssembledOrder {
                    items: self.load_items(&txn, order.id).await?,
                    order,
                    merged: false,
                }
            }
        };

        // The order row is the source of truth; the consumed cart items are
        // pruned on the same transaction so a crash cannot replay them.
        self.carts
            .prune_or_delete_on(&txn, resolved.cart.clone(), &selected_ids)
            .await?;

        txn.commit().await?;

        if assembled.merged {
            info!(order_id = %assembled.order.id, "Merged items into active table order");
            self.event_sender
                .send_or_log(Event::OrderMerged {
                    order_id: assembled.order.id,
                    items_added: selected_ids.len(),
                    new_subtotal: assembled.order.subtotal,
                })
                .await;
        } else {
            info!(order_id = %assembled.order.id, "Order created");
            self.event_sender
                .send_or_log(Event::OrderCreated(assembled.order.id))
                .await;
            if let Some(table_number) = assembled.order.table_number {
                self.event_sender
                    .send_or_log(Event::TableBooked {
                        hotel_id,
                        table_number,
                        order_id: assembled.order.id,
                    })
                    .await;
            }
        }

        Ok(assembled)
    }

    /// Claim-or-merge for a table order. Two passes: a lost claim re-reads
    /// the slot and merges into the winner; a slot that empties between the
    /// claim and the read (terminal release mid-flight) is retried once
    /// before giving up with a conflict.
    #[allow(clippy::too_many_arguments)]
    async fn assemble_for_table(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        hotel: &hotel::Model,
        rates: &RateCard,
        table_number: i32,
        resolved: &CartWithItems,
        selected: &[cart_item::Model],
        selected_subtotal: Decimal,
        payment_method: PaymentMethod,
        special_instructions: Option<&str>,
    ) -> Result<AssembledOrder, ServiceError> {
        for attempt in 0..2 {
            let candidate_id = Uuid::new_v4();
            if self
                .tables
                .try_claim_active_order(txn, hotel.id, table_number, candidate_id)
                .await?
            {
                let order = self
                    .insert_new_order_with_id(
                        txn,
                        candidate_id,
                        user_id,
                        hotel,
                        rates,
                        Some(table_number),
                        resolved,
                        selected,
                        selected_subtotal,
                        payment_method,
                        special_instructions,
                    )
                    .await?;
                return Ok(AssembledOrder {
                    items: self.load_items(txn, order.id).await?,
                    order,
                    merged: false,
                });
            }

            match self
                .tables
                .active_order_id(txn, hotel.id, table_number)
                .await?
            {
                Some(active_id) => {
                    info!(order_id = %active_id, table_number, "Active table order found; merging");
                    let order = self
                        .merge_into_order(
                            txn,
                            active_id,
                            user_id,
                            rates,
                            resolved,
                            selected,
                            selected_subtotal,
                            payment_method,
                        )
                        .await?;
                    return Ok(AssembledOrder {
                        items: self.load_items(txn, order.id).await?,
                        order,
                        merged: true,
                    });
                }
                None => {
                    warn!(attempt, table_number, "Active order slot emptied mid-flight; retrying claim");
                    continue;
                }
            }
        }

        Err(ServiceError::Conflict(
            "Could not secure the table's active order; please retry".to_string(),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_new_order(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        hotel: &hotel::Model,
        rates: &RateCard,
        table_number: Option<i32>,
        resolved: &CartWithItems,
        selected: &[cart_item::Model],
        selected_subtotal: Decimal,
        payment_method: PaymentMethod,
        special_instructions: Option<&str>,
    ) -> Result<order::Model, ServiceError> {
        self.insert_new_order_with_id(
            txn,
            Uuid::new_v4(),
            user_id,
            hotel,
            rates,
            table_number,
            resolved,
            selected,
            selected_subtotal,
            payment_method,
            special_instructions,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_new_order_with_id(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        user_id: Uuid,
        hotel: &hotel::Model,
        rates: &RateCard,
        table_number: Option<i32>,
        resolved: &CartWithItems,
        selected: &[cart_item::Model],
        selected_subtotal: Decimal,
        payment_method: PaymentMethod,
        special_instructions: Option<&str>,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let charges = compute_charges(selected_subtotal, rates);
        let discount = resolved.cart.discount_amount;
        let total_amount = compute_total(selected_subtotal, &charges, discount);

        let item_payment_status = initial_item_payment_status(payment_method);
        let order_active = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            hotel_id: Set(hotel.id),
            table_number: Set(table_number),
            users: Set(serde_json::json!([user_id])),
            subtotal: Set(selected_subtotal),
            cgst_amount: Set(charges.cgst_amount),
            sgst_amount: Set(charges.sgst_amount),
            service_charge: Set(charges.service_charge),
            discount_amount: Set(discount),
            total_amount: Set(total_amount),
            amount_paid: Set(Decimal::ZERO),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(Some(payment_method)),
            status: Set(OrderStatus::Pending),
            coupon_code: Set(resolved.cart.applied_coupon_code.clone()),
            notes: Set(special_instructions.map(str::to_string)),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };
        let order = order_active.insert(txn).await?;

        self.insert_line_items(txn, order.id, user_id, selected, item_payment_status, payment_method)
            .await?;

        // Derive the initial paid amount from the ledger rather than assuming
        // zero: an online-gateway order lands with every item already paid.
        let items = self.load_items(txn, order.id).await?;
        let amount_paid =
            recompute_amount_paid(order.subtotal, order.service_charge, rates, &items);
        let payment_status = derive_payment_status(amount_paid, order.total_amount);
        let mut active: order::ActiveModel = order.into();
        active.amount_paid = Set(amount_paid);
        active.payment_status = Set(payment_status);
        let order = active.update(txn).await?;

        if let Some(code) = &order.coupon_code {
            self.coupons.apply_once(txn, code, order.id, user_id).await?;
        }

        Ok(order)
    }

    /// Merge path: appends the selected items to the active order, unions the
    /// orderer into `users`, and recomputes taxes and the service charge on
    /// the cumulative subtotal. Existing items keep their payment status
    /// untouched; `amount_paid` is recomputed over all items, not adjusted.
    #[allow(clippy::too_many_arguments)]
    async fn merge_into_order(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        user_id: Uuid,
        rates: &RateCard,
        resolved: &CartWithItems,
        selected: &[cart_item::Model],
        selected_subtotal: Decimal,
        payment_method: PaymentMethod,
    ) -> Result<order::Model, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::IsDeleted.eq(false))
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let item_payment_status = initial_item_payment_status(payment_method);
        self.insert_line_items(txn, order.id, user_id, selected, item_payment_status, payment_method)
            .await?;

        let mut users = order.user_ids();
        if !users.contains(&user_id) {
            users.push(user_id);
        }

        let subtotal = order.subtotal + selected_subtotal;
        let discount = order.discount_amount + resolved.cart.discount_amount;
        // Recompute on the cumulative subtotal, matching the observed
        // behavior of the system this replaces (not an additive tax delta).
        let charges = compute_charges(subtotal, rates);
        let total_amount = compute_total(subtotal, &charges, discount);

        let items = self.load_items(txn, order.id).await?;
        let amount_paid = recompute_amount_paid(subtotal, charges.service_charge, rates, &items);
        let payment_status = derive_payment_status(amount_paid, total_amount);

        let newly_set_coupon = order.coupon_code.is_none()
            && resolved.cart.applied_coupon_code.is_some();
        let coupon_code = order
            .coupon_code
            .clone()
            .or_else(|| resolved.cart.applied_coupon_code.clone());

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.users = Set(serde_json::json!(users));
        active.subtotal = Set(subtotal);
        active.cgst_amount = Set(charges.cgst_amount);
        active.sgst_amount = Set(charges.sgst_amount);
        active.service_charge = Set(charges.service_charge);
        active.discount_amount = Set(discount);
        active.total_amount = Set(total_amount);
        active.amount_paid = Set(amount_paid);
        active.payment_status = Set(payment_status);
        active.coupon_code = Set(coupon_code.clone());
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);
        let order = active.update(txn).await?;

        // Only a coupon newly brought in by this merge is counted; an
        // already-counted code on the order is never re-applied.
        if newly_set_coupon {
            if let Some(code) = &coupon_code {
                self.coupons.apply_once(txn, code, order.id, user_id).await?;
            }
        }

        Ok(order)
    }

    async fn insert_line_items(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        user_id: Uuid,
        selected: &[cart_item::Model],
        payment_status: ItemPaymentStatus,
        payment_method: PaymentMethod,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        for item in selected {
            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                menu_item_id: Set(item.menu_item_id),
                name: Set(item.name.clone()),
                quantity: Set(item.quantity),
                size: Set(item.size.clone()),
                addons: Set(item.addons.clone()),
                price: Set(item.price),
                status: Set(ItemStatus::Pending),
                payment_status: Set(payment_status),
                payment_method: Set(matches!(payment_status, ItemPaymentStatus::Paid)
                    .then_some(payment_method)),
                ordered_by: Set(user_id),
                special_instructions: Set(item.special_instructions.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            };
            line.insert(txn).await?;
        }
        Ok(())
    }

    async fn load_items<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(conn)
            .await?)
    }

    /// Retrieves an order with its items; soft-deleted orders read as absent.
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::IsDeleted.eq(false))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = self.load_items(self.db.as_ref(), order_id).await?;
        Ok((order, items))
    }

    /// Lists orders newest-first with a totals summary over the full filter
    /// (not just the returned page).
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64, OrderListSummary), ServiceError> {
        let mut query = OrderEntity::find().filter(order::Column::IsDeleted.eq(false));
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(hotel_id) = filter.hotel_id {
            query = query.filter(order::Column::HotelId.eq(hotel_id));
        }
        if let Some(table_number) = filter.table_number {
            query = query.filter(order::Column::TableNumber.eq(table_number));
        }

        let totals: Vec<Decimal> = query
            .clone()
            .select_only()
            .column(order::Column::TotalAmount)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        let summary = OrderListSummary {
            count: totals.len() as u64,
            total_amount: totals.iter().copied().sum(),
        };

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total, summary))
    }

    /// Updates the aggregate order status. Terminal transitions release the
    /// table; an optional reason is recorded on the order notes.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::IsDeleted.eq(false))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        // Delivered and cancelled orders released their table already;
        // reviving one would leave it active against a free table slot.
        if order.is_terminal() {
            return Err(ServiceError::BusinessRule(format!(
                "Order is {:?} and its status can no longer change",
                order.status
            )));
        }

        let old_status = order.status;
        let hotel_id = order.hotel_id;
        let table_number = order.table_number;
        let version = order.version;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        if let Some(reason) = reason {
            active.notes = Set(Some(reason));
        }
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        if updated.is_terminal() {
            if let Some(table_number) = table_number {
                self.tables
                    .release(&txn, hotel_id, table_number, order_id)
                    .await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{:?}", old_status),
                new_status: format!("{:?}", new_status),
            })
            .await;

        Ok(updated)
    }

    /// Completes a fully-paid order and frees its table. Completion of an
    /// order that is not fully paid is rejected.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn complete_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::IsDeleted.eq(false))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.is_terminal() {
            return Err(ServiceError::BusinessRule(format!(
                "Order is {:?} and cannot be completed",
                order.status
            )));
        }
        if order.payment_status != PaymentStatus::Paid {
            return Err(ServiceError::BusinessRule(
                "Order payment is incomplete".to_string(),
            ));
        }

        let hotel_id = order.hotel_id;
        let table_number = order.table_number;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Delivered);
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        if let Some(table_number) = table_number {
            self.tables
                .release(&txn, hotel_id, table_number, order_id)
                .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCompleted(order_id))
            .await;
        Ok(updated)
    }

    /// Kitchen-side per-item status updates (pending/preparing/served/cancelled).
    pub async fn update_item_status(
        &self,
        order_id: Uuid,
        item_id: Uuid,
        status: ItemStatus,
    ) -> Result<order_item::Model, ServiceError> {
        let item = OrderItemEntity::find_by_id(item_id)
            .filter(order_item::Column::OrderId.eq(order_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item {} not found on order {}", item_id, order_id))
            })?;

        let mut active: order_item::ActiveModel = item.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Soft delete. A deleted active order also releases its table.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::IsDeleted.eq(false))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let hotel_id = order.hotel_id;
        let table_number = order.table_number;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);
        active.update(&txn).await?;

        if let Some(table_number) = table_number {
            self.tables
                .release(&txn, hotel_id, table_number, order_id)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

/// Filters the cart down to the requested selection. An explicit selection
/// that matches nothing is an error; no selection means everything.
fn select_items(
    items: &[cart_item::Model],
    selected_ids: Option<&[Uuid]>,
) -> Result<Vec<cart_item::Model>, ServiceError> {
    match selected_ids {
        Some(ids) => {
            let picked: Vec<cart_item::Model> = items
                .iter()
                .filter(|item| ids.contains(&item.id))
                .cloned()
                .collect();
            if picked.is_empty() {
                return Err(ServiceError::BusinessRule(
                    "No items selected".to_string(),
                ));
            }
            Ok(picked)
        }
        None => Ok(items.to_vec()),
    }
}

fn initial_item_payment_status(payment_method: PaymentMethod) -> ItemPaymentStatus {
    // An online-gateway payment settles at order time; everything else is
    // collected at the table later.
    match payment_method {
        PaymentMethod::Online => ItemPaymentStatus::Paid,
        _ => ItemPaymentStatus::Pending,
    }
}

fn generate_order_number() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", &id[..8].to_uppercase())
}
