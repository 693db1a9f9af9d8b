use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted at each state transition. Consumed in-process by
/// [`process_events`]; every variant is logged as a structured record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartResolved {
        cart_id: Uuid,
        user_id: Uuid,
        shared: bool,
    },
    CartPruned {
        cart_id: Uuid,
        removed_items: usize,
        deleted: bool,
    },

    // Order events
    OrderCreated(Uuid),
    OrderMerged {
        order_id: Uuid,
        items_added: usize,
        new_subtotal: Decimal,
    },
    OrderPaymentRecorded {
        order_id: Uuid,
        amount_paid: Decimal,
        payment_status: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCompleted(Uuid),

    // Table events
    TableBooked {
        hotel_id: Uuid,
        table_number: i32,
        order_id: Uuid,
    },
    TableReleased {
        hotel_id: Uuid,
        table_number: i32,
    },

    // Coupon events
    CouponRedeemed {
        code: String,
        order_id: Uuid,
    },

    // Membership events
    MembershipConsumed {
        membership_id: Uuid,
        meals: i32,
        remaining: i32,
    },
    MembershipStatusChanged {
        membership_id: Uuid,
        old_status: String,
        new_status: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing the request when the
    /// channel is closed or full.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropped domain event");
        }
    }
}

/// Builds an event channel pair with a bounded buffer.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Consumes domain events and emits structured log records. Spawned once at
/// startup; exits when all senders are dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::OrderMerged {
                order_id,
                items_added,
                new_subtotal,
            } => {
                info!(order_id = %order_id, items_added, subtotal = %new_subtotal, "event: order merged");
            }
            Event::OrderPaymentRecorded {
                order_id,
                amount_paid,
                payment_status,
            } => {
                info!(order_id = %order_id, amount_paid = %amount_paid, payment_status, "event: payment recorded");
            }
            Event::TableBooked {
                hotel_id,
                table_number,
                order_id,
            } => {
                info!(hotel_id = %hotel_id, table_number, order_id = %order_id, "event: table booked");
            }
            Event::TableReleased {
                hotel_id,
                table_number,
            } => {
                info!(hotel_id = %hotel_id, table_number, "event: table released");
            }
            other => {
                info!(event = ?other, "event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (sender, mut rx) = channel(4);
        sender.send(Event::OrderCreated(Uuid::new_v4())).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(_))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        // Must not panic or error out
        sender.send_or_log(Event::OrderCompleted(Uuid::new_v4())).await;
    }
}
