//! Payment ledger: derives `amount_paid` and `payment_status` from the line
//! items, and applies per-item and manual payments.
//!
//! `amount_paid` is never incremented in place (outside the explicit manual
//! escape hatch); it is recomputed from scratch after every mutation so that
//! merges, retries and partial failures stay self-correcting.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        hotel,
        order::{self, Entity as OrderEntity, PaymentMethod, PaymentStatus},
        order_item::{self, Entity as OrderItemEntity, ItemPaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::charges::RateCard,
};

/// Pure recomputation of the paid amount: the paid line items' subtotal,
/// CGST/SGST on that subset, plus a share of the order's service charge
/// proportional to the paid subset's fraction of the subtotal.
pub fn recompute_amount_paid(
    subtotal: Decimal,
    service_charge: Decimal,
    rates: &RateCard,
    items: &[order_item::Model],
) -> Decimal {
    let paid_subtotal: Decimal = items
        .iter()
        .filter(|item| item.payment_status == ItemPaymentStatus::Paid)
        .map(|item| item.price)
        .sum();

    let taxes =
        paid_subtotal * (rates.cgst_rate + rates.sgst_rate) / Decimal::ONE_HUNDRED;
    let service_share = if subtotal.is_zero() {
        Decimal::ZERO
    } else {
        paid_subtotal / subtotal * service_charge
    };

    paid_subtotal + taxes + service_share
}

/// Derives the aggregate payment status: `paid` iff the ledger covers the
/// total, `partially-paid` for anything in between, `pending` otherwise.
pub fn derive_payment_status(amount_paid: Decimal, total_amount: Decimal) -> PaymentStatus {
    if amount_paid >= total_amount && !total_amount.is_zero() {
        PaymentStatus::Paid
    } else if amount_paid > Decimal::ZERO {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Pending
    }
}

const PAYMENT_RETRY_LIMIT: u32 = 3;

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Marks the targeted pending items as paid by `payer_id` and updates the
    /// order aggregates. Items already paid are silently skipped, so paying
    /// the same item twice has no additional effect; if nothing flips the
    /// call is rejected.
    ///
    /// The order write is guarded on the version read at the start, so a
    /// concurrent payment forces a full re-read and recompute instead of
    /// persisting a ledger that omits the other payment.
    #[instrument(skip(self, item_ids), fields(order_id = %order_id, payer_id = %payer_id))]
    pub async fn pay_for_items(
        &self,
        order_id: Uuid,
        item_ids: &[Uuid],
        payer_id: Uuid,
        payment_method: PaymentMethod,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        if item_ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "item_ids must not be empty".to_string(),
            ));
        }

        for attempt in 0..PAYMENT_RETRY_LIMIT {
            let txn = self.db.begin().await?;

            let order = OrderEntity::find_by_id(order_id)
                .filter(order::Column::IsDeleted.eq(false))
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

            if !order.user_ids().contains(&payer_id) {
                return Err(ServiceError::Forbidden(
                    "Payer is not a party to this order".to_string(),
                ));
            }

            let hotel = hotel::Entity::find_by_id(order.hotel_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Hotel not found".to_string()))?;
            let rates = RateCard::from(&hotel);

            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await?;

            let now = Utc::now();
            let mut amount_just_paid = Decimal::ZERO;
            for item in &items {
                if !item_ids.contains(&item.id) {
                    continue;
                }
                if item.payment_status == ItemPaymentStatus::Paid {
                    continue;
                }
                amount_just_paid += item.price;

                let mut active: order_item::ActiveModel = item.clone().into();
                active.payment_status = Set(ItemPaymentStatus::Paid);
                active.payment_method = Set(Some(payment_method));
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }

            if amount_just_paid.is_zero() {
                return Err(ServiceError::BusinessRule(
                    "Nothing to pay: selected items are already paid or unknown".to_string(),
                ));
            }

            // Re-read and recompute over the whole order rather than incrementing.
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await?;
            let amount_paid =
                recompute_amount_paid(order.subtotal, order.service_charge, &rates, &items);
            let payment_status = derive_payment_status(amount_paid, order.total_amount);

            let expected_version = order.version;
            let result = OrderEntity::update_many()
                .col_expr(order::Column::AmountPaid, Expr::value(amount_paid))
                .col_expr(order::Column::PaymentStatus, Expr::value(payment_status))
                .col_expr(order::Column::UpdatedAt, Expr::value(now))
                .col_expr(order::Column::Version, Expr::value(expected_version + 1))
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::Version.eq(expected_version))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                // Another payment landed between our read and write; all item
                // flips in this transaction are discarded with it.
                txn.rollback().await?;
                warn!(attempt, "Concurrent order update; retrying payment");
                continue;
            }

            let updated = OrderEntity::find_by_id(order_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

            txn.commit().await?;

            info!(order_id = %order_id, amount_paid = %amount_paid, "Ledger recomputed after item payment");
            self.event_sender
                .send_or_log(Event::OrderPaymentRecorded {
                    order_id,
                    amount_paid,
                    payment_status: format!("{:?}", payment_status),
                })
                .await;

            return Ok((updated, items));
        }

        Err(ServiceError::Conflict(
            "Order was updated concurrently; please retry the payment".to_string(),
        ))
    }

    /// Adds a caller-supplied, tax-inclusive amount straight onto the order's
    /// paid total. Intentionally unbounded above the total: cash
    /// reconciliation sometimes overshoots.
    #[instrument(skip(self), fields(order_id = %order_id, amount = %amount))]
    pub async fn record_manual_payment(
        &self,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<order::Model, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be positive".to_string(),
            ));
        }

        for attempt in 0..PAYMENT_RETRY_LIMIT {
            let order = OrderEntity::find_by_id(order_id)
                .filter(order::Column::IsDeleted.eq(false))
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

            let amount_paid = order.amount_paid + amount;
            let payment_status = derive_payment_status(amount_paid, order.total_amount);

            let expected_version = order.version;
            let result = OrderEntity::update_many()
                .col_expr(order::Column::AmountPaid, Expr::value(amount_paid))
                .col_expr(order::Column::PaymentStatus, Expr::value(payment_status))
                .col_expr(
                    order::Column::PaymentMethod,
                    Expr::value(Some(PaymentMethod::Manual)),
                )
                .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
                .col_expr(order::Column::Version, Expr::value(expected_version + 1))
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::Version.eq(expected_version))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 0 {
                warn!(attempt, "Concurrent order update; retrying manual payment");
                continue;
            }

            let updated = OrderEntity::find_by_id(order_id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

            self.event_sender
                .send_or_log(Event::OrderPaymentRecorded {
                    order_id,
                    amount_paid,
                    payment_status: format!("{:?}", payment_status),
                })
                .await;

            return Ok(updated);
        }

        Err(ServiceError::Conflict(
            "Order was updated concurrently; please retry the payment".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rates() -> RateCard {
        RateCard {
            cgst_rate: dec!(2.5),
            sgst_rate: dec!(2.5),
            service_charge_rate: dec!(5),
        }
    }

    fn item(price: Decimal, paid: bool) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            menu_item_id: Uuid::new_v4(),
            name: "item".to_string(),
            quantity: 1,
            size: None,
            addons: serde_json::json!([]),
            price,
            status: order_item::ItemStatus::Pending,
            payment_status: if paid {
                ItemPaymentStatus::Paid
            } else {
                ItemPaymentStatus::Pending
            },
            payment_method: None,
            ordered_by: Uuid::new_v4(),
            special_instructions: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn proportional_service_charge_for_partial_payment() {
        // Subtotal 400, service charge 20; paying the 100 item alone covers
        // a quarter of the service charge.
        let items = vec![item(dec!(100), true), item(dec!(200), false), item(dec!(100), false)];
        let amount = recompute_amount_paid(dec!(400), dec!(20), &rates(), &items);
        assert_eq!(amount, dec!(110));
    }

    #[test]
    fn fully_paid_order_covers_total() {
        let items = vec![item(dec!(100), true), item(dec!(200), true)];
        let amount = recompute_amount_paid(dec!(300), dec!(15), &rates(), &items);
        assert_eq!(amount, dec!(330));
        assert_eq!(derive_payment_status(amount, dec!(330)), PaymentStatus::Paid);
    }

    #[test]
    fn no_paid_items_means_zero() {
        let items = vec![item(dec!(100), false)];
        let amount = recompute_amount_paid(dec!(100), dec!(5), &rates(), &items);
        assert_eq!(amount, Decimal::ZERO);
        assert_eq!(
            derive_payment_status(amount, dec!(110)),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn zero_subtotal_allocates_no_service_charge() {
        let amount = recompute_amount_paid(Decimal::ZERO, dec!(15), &rates(), &[]);
        assert_eq!(amount, Decimal::ZERO);
    }

    #[test]
    fn recompute_is_idempotent() {
        let items = vec![item(dec!(100), true), item(dec!(200), false)];
        let first = recompute_amount_paid(dec!(300), dec!(15), &rates(), &items);
        let second = recompute_amount_paid(dec!(300), dec!(15), &rates(), &items);
        assert_eq!(first, second);
    }

    #[test]
    fn partial_status_between_zero_and_total() {
        assert_eq!(
            derive_payment_status(dec!(110), dec!(440)),
            PaymentStatus::PartiallyPaid
        );
        assert_eq!(
            derive_payment_status(dec!(440), dec!(440)),
            PaymentStatus::Paid
        );
        // Manual overshoot still counts as paid
        assert_eq!(
            derive_payment_status(dec!(500), dec!(440)),
            PaymentStatus::Paid
        );
    }
}
