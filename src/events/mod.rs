use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::MovementType;

/// Domain events published after a transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderUpdated(Uuid),
    OrderDeleted(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderTotalsRecalculated {
        order_id: Uuid,
        valor_total: Decimal,
        valor_final: Decimal,
    },

    // Line item events
    LineItemAdded { order_id: Uuid, item_id: Uuid },
    LineItemUpdated { order_id: Uuid, item_id: Uuid },
    LineItemRemoved { order_id: Uuid, item_id: Uuid },

    // Stock events
    PartCreated(Uuid),
    PartUpdated(Uuid),
    PartDeleted(Uuid),
    StockMovementRecorded {
        movement_id: Uuid,
        part_id: Uuid,
        tipo: MovementType,
        quantidade: i32,
        quantidade_anterior: i32,
        quantidade_nova: i32,
    },
    StockMovementReversed {
        movement_id: Uuid,
        part_id: Uuid,
        quantidade_anterior: i32,
        quantidade_nova: i32,
    },
    LowStockDetected {
        part_id: Uuid,
        codigo: String,
        quantidade_atual: i32,
        quantidade_minima: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes after a commit. The data is already durable, so a closed
    /// channel is logged rather than surfaced to the caller.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }

    /// True once the event processor has shut down.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumes domain events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockDetected {
                part_id,
                codigo,
                quantidade_atual,
                quantidade_minima,
            } => {
                warn!(
                    part_id = %part_id,
                    codigo = %codigo,
                    quantidade_atual,
                    quantidade_minima,
                    "Part at or below minimum stock"
                );
            }
            Event::StockMovementRecorded {
                movement_id,
                part_id,
                tipo,
                quantidade_anterior,
                quantidade_nova,
                ..
            } => {
                info!(
                    movement_id = %movement_id,
                    part_id = %part_id,
                    tipo = %tipo,
                    quantidade_anterior,
                    quantidade_nova,
                    "Stock movement recorded"
                );
            }
            Event::OrderTotalsRecalculated {
                order_id,
                valor_total,
                valor_final,
            } => {
                debug!(
                    order_id = %order_id,
                    valor_total = %valor_total,
                    valor_final = %valor_final,
                    "Order totals recalculated"
                );
            }
            other => info!("Received event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();

        sender.send(Event::OrderCreated(id)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::OrderCreated(id)));
    }

    #[tokio::test]
    async fn closed_channel_is_not_fatal() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::PartDeleted(Uuid::nil())).await.is_err());
        sender.send_or_log(Event::PartDeleted(Uuid::nil())).await;
    }

    #[tokio::test]
    async fn processor_stops_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        tx.send(Event::OrderDeleted(Uuid::new_v4())).await.unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
