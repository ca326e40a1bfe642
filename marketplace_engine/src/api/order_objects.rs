use chrono::{DateTime, Utc};
use mp_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db_types::{Order, OrderItem, OrderStatus, PaymentStatus, TrackingEvent};

//--------------------------------------   OrderWithItems    ---------------------------------------------------------
/// An order together with its line items, as returned from the creation and lookup flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderWithItems {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self { order, items }
    }
}

//--------------------------------------  OrderQueryFilter   ---------------------------------------------------------
/// Filter for order scans. All criteria are optional and combined with AND.
#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub customer_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub statuses: Vec<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: i64) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn since(mut self, ts: DateTime<Utc>) -> Self {
        self.since = Some(ts);
        self
    }

    pub fn until(mut self, ts: DateTime<Utc>) -> Self {
        self.until = Some(ts);
        self
    }

    pub fn paged(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() &&
            self.vendor_id.is_none() &&
            self.statuses.is_empty() &&
            self.payment_status.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

//--------------------------------------     OrderStats      ---------------------------------------------------------
/// Aggregate order statistics for a filter. Revenue figures only count delivered orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    pub confirmed_orders: i64,
    pub preparing_orders: i64,
    pub ready_orders: i64,
    pub picked_up_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub paid_orders: i64,
    pub total_revenue: Cents,
    pub average_order_value: Cents,
}

//--------------------------------------   OrderHistory      ---------------------------------------------------------
/// The reconstructable history of an order: its current state plus the full tracking log, oldest event first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHistory {
    pub order: Order,
    pub events: Vec<TrackingEvent>,
}
