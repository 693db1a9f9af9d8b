//! Coupon applier. The usage counter is incremented exactly once per order:
//! a `coupon_redemptions` row keyed `(coupon_id, order_id)` is written
//! first, and only a fresh row bumps the counter. Client retries of the same
//! order replay as no-ops.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{
        coupon::{self, Entity as CouponEntity},
        coupon_redemption::{self, Entity as RedemptionEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Clone)]
pub struct CouponService {
    event_sender: EventSender,
}

impl CouponService {
    pub fn new(event_sender: EventSender) -> Self {
        Self { event_sender }
    }

    /// Counts one use of `code` against `order_id` for `user_id`. Idempotent
    /// per order id. An unknown code is logged and skipped rather than
    /// failing the order: coupon storage is an external collaborator and the
    /// discount was already priced into the cart.
    #[instrument(skip(self, conn), fields(code = %code, order_id = %order_id))]
    pub async fn apply_once<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let coupon = match CouponEntity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(conn)
            .await?
        {
            Some(coupon) => coupon,
            None => {
                warn!("Coupon code not found; skipping usage count");
                return Ok(());
            }
        };

        let already_counted = RedemptionEntity::find()
            .filter(coupon_redemption::Column::CouponId.eq(coupon.id))
            .filter(coupon_redemption::Column::OrderId.eq(order_id))
            .one(conn)
            .await?
            .is_some();
        if already_counted {
            return Ok(());
        }

        let redemption = coupon_redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            order_id: Set(order_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
        };
        redemption.insert(conn).await?;

        let mut used_by = coupon.used_by_ids();
        if !used_by.contains(&user_id) {
            used_by.push(user_id);
        }
        let total_uses = coupon.total_uses;
        let mut active: coupon::ActiveModel = coupon.into();
        active.total_uses = Set(total_uses + 1);
        active.used_by = Set(serde_json::json!(used_by));
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        self.event_sender
            .send_or_log(Event::CouponRedeemed {
                code: code.to_string(),
                order_id,
            })
            .await;
        Ok(())
    }
}
