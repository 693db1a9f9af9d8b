pub mod carts;
pub mod memberships;
pub mod orders;
