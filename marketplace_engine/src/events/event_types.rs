use crate::db_types::{Order, OrderStatus, Payment};

/// Fired when a payment against an order settles successfully.
#[derive(Debug, Clone)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub payment: Payment,
}

impl OrderPaidEvent {
    pub fn new(order: Order, payment: Payment) -> Self {
        Self { order, payment }
    }
}

/// Fired whenever an order moves along the fulfilment state machine.
#[derive(Debug, Clone)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub old_status: OrderStatus,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, old_status: OrderStatus) -> Self {
        Self { order, old_status }
    }
}
