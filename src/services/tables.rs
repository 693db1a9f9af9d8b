//! Table state manager. `dining_tables.active_order_id` is the keyed
//! aggregate index for "active order per table": claiming it is one
//! conditional write, never read-then-write, so invariant "at most one
//! active order per table" holds under concurrent creation.

use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::dining_table::{self, Entity as TableEntity, TableStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Clone)]
pub struct TableService {
    event_sender: EventSender,
}

impl TableService {
    pub fn new(event_sender: EventSender) -> Self {
        Self { event_sender }
    }

    pub async fn find_table<C: ConnectionTrait>(
        &self,
        conn: &C,
        hotel_id: Uuid,
        table_number: i32,
    ) -> Result<dining_table::Model, ServiceError> {
        TableEntity::find()
            .filter(dining_table::Column::HotelId.eq(hotel_id))
            .filter(dining_table::Column::TableNumber.eq(table_number))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Table {} not found for hotel {}",
                    table_number, hotel_id
                ))
            })
    }

    /// Attempts to claim the table's active-order slot for `order_id`.
    /// Returns `true` when this call won the slot. A `false` return means
    /// another order holds it; the caller re-reads and merges instead.
    pub async fn try_claim_active_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        hotel_id: Uuid,
        table_number: i32,
        order_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = TableEntity::update_many()
            .col_expr(
                dining_table::Column::ActiveOrderId,
                Expr::value(Some(order_id)),
            )
            .col_expr(
                dining_table::Column::Status,
                Expr::value(TableStatus::Booked),
            )
            .col_expr(dining_table::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(dining_table::Column::HotelId.eq(hotel_id))
            .filter(dining_table::Column::TableNumber.eq(table_number))
            .filter(dining_table::Column::ActiveOrderId.is_null())
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    /// The order currently holding the table, if any.
    pub async fn active_order_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        hotel_id: Uuid,
        table_number: i32,
    ) -> Result<Option<Uuid>, ServiceError> {
        Ok(self
            .find_table(conn, hotel_id, table_number)
            .await?
            .active_order_id)
    }

    /// Releases the table held by `order_id` and marks it available again.
    /// Conditional on the slot still pointing at this order, so a stale
    /// release cannot free a table re-claimed by a newer order.
    #[instrument(skip(self, conn), fields(hotel_id = %hotel_id, table_number = table_number))]
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        hotel_id: Uuid,
        table_number: i32,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = TableEntity::update_many()
            .col_expr(
                dining_table::Column::ActiveOrderId,
                Expr::value(None::<Uuid>),
            )
            .col_expr(
                dining_table::Column::Status,
                Expr::value(TableStatus::Available),
            )
            .col_expr(dining_table::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(dining_table::Column::HotelId.eq(hotel_id))
            .filter(dining_table::Column::TableNumber.eq(table_number))
            .filter(dining_table::Column::ActiveOrderId.eq(order_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 1 {
            info!("Table released");
            self.event_sender
                .send_or_log(Event::TableReleased {
                    hotel_id,
                    table_number,
                })
                .await;
        }
        Ok(())
    }
}
