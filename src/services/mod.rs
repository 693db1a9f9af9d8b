pub mod carts;
pub mod charges;
pub mod coupons;
pub mod memberships;
pub mod orders;
pub mod payments;
pub mod tables;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::events::EventSender;

/// All domain services, wired once at startup and cloned into handlers.
#[derive(Clone)]
pub struct AppServices {
    pub carts: carts::CartService,
    pub orders: orders::OrderService,
    pub payments: payments::PaymentService,
    pub tables: tables::TableService,
    pub coupons: coupons::CouponService,
    pub memberships: memberships::MembershipService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        let carts = carts::CartService::new(db.clone(), event_sender.clone());
        let tables = tables::TableService::new(event_sender.clone());
        let coupons = coupons::CouponService::new(event_sender.clone());
        let orders = orders::OrderService::new(
            db.clone(),
            event_sender.clone(),
            carts.clone(),
            tables.clone(),
            coupons.clone(),
        );
        let payments = payments::PaymentService::new(db.clone(), event_sender.clone());
        let memberships = memberships::MembershipService::new(db, event_sender);
        Self {
            carts,
            orders,
            payments,
            tables,
            coupons,
            memberships,
        }
    }
}
