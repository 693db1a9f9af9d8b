pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod coupon_redemption;
pub mod dining_table;
pub mod hotel;
pub mod membership_history;
pub mod order;
pub mod order_item;
pub mod user_membership;
