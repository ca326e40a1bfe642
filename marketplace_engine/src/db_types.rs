use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mp_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

//--------------------------------------    OrderNumber      ---------------------------------------------------------
/// The human-readable order number, e.g. `ORD483201557`. Globally unique and immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    OrderStatus      ---------------------------------------------------------
/// The order lifecycle state machine:
///
/// ```text
/// pending → confirmed → preparing → ready → picked_up → delivered
///    └─────────┴──→ cancelled
/// ```
///
/// `Delivered` and `Cancelled` are terminal. Cancellation is only reachable from `Pending` or `Confirmed`;
/// this is a business rule, not an incidental restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The order has been placed but the vendor has not yet confirmed it.
    Pending,
    /// The vendor has accepted the order.
    Confirmed,
    /// The vendor is preparing the order.
    Preparing,
    /// The order is ready for pickup by the courier.
    Ready,
    /// A courier has collected the order.
    PickedUp,
    /// The order has been delivered. Terminal.
    Delivered,
    /// The order was cancelled before preparation started. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// Returns true if `next` is a legal successor of `self` in the state graph.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) |
                (Confirmed, Preparing) |
                (Preparing, Ready) |
                (Ready, PickedUp) |
                (PickedUp, Delivered) |
                (Pending, Cancelled) |
                (Confirmed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "picked_up" => Ok(Self::PickedUp),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------   PaymentStatus     ---------------------------------------------------------
/// The payment axis of an order. Independent from [`OrderStatus`]: a vendor can confirm an order before the
/// payment settles (cash-on-delivery), and a payment can fail after the order exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

//--------------------------------------  SettlementStatus   ---------------------------------------------------------
/// Status of a payment record as asserted by the external processor.
///
/// `pending → succeeded | failed`, `succeeded → refunded`, and any state can be marked `cancelled` by an
/// administrator. Notification delivery is at-least-once and may arrive out of order, so transitions are
/// compared against [`SettlementStatus::rank`] rather than arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    Cancelled,
}

impl SettlementStatus {
    /// Total settlement order used to reject stale notifications. A transition is only genuine when the target
    /// rank exceeds the current rank; an equal-status repeat is an idempotent no-op, and anything else is stale.
    pub fn rank(self) -> u8 {
        match self {
            SettlementStatus::Pending => 0,
            SettlementStatus::Succeeded | SettlementStatus::Failed => 1,
            SettlementStatus::Refunded => 2,
            SettlementStatus::Cancelled => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SettlementStatus::Pending)
    }
}

impl Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Succeeded => "succeeded",
            SettlementStatus::Failed => "failed",
            SettlementStatus::Refunded => "refunded",
            SettlementStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for SettlementStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid settlement status: {s}"))),
        }
    }
}

//--------------------------------------       Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub vendor_id: i64,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub subtotal: Cents,
    pub delivery_fee: Cents,
    pub tax_amount: Cents,
    pub total_amount: Cents,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub delivery_address: String,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub special_instructions: Option<String>,
    pub estimated_delivery_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i64,
    pub vendor_id: i64,
    /// Monetary breakdown. The invariant `total = subtotal + delivery_fee + tax` is checked at creation.
    pub subtotal: Cents,
    pub delivery_fee: Cents,
    pub tax_amount: Cents,
    pub payment_method: String,
    pub delivery_address: String,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub special_instructions: Option<String>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    pub fn new(customer_id: i64, vendor_id: i64, delivery_address: impl Into<String>) -> Self {
        Self {
            customer_id,
            vendor_id,
            subtotal: Cents::default(),
            delivery_fee: Cents::default(),
            tax_amount: Cents::default(),
            payment_method: "card".to_string(),
            delivery_address: delivery_address.into(),
            delivery_latitude: None,
            delivery_longitude: None,
            special_instructions: None,
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: NewOrderItem) -> Self {
        self.subtotal = self.subtotal + item.total_price;
        self.items.push(item);
        self
    }

    pub fn with_fees(mut self, delivery_fee: Cents, tax_amount: Cents) -> Self {
        self.delivery_fee = delivery_fee;
        self.tax_amount = tax_amount;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.special_instructions = Some(instructions.into());
        self
    }

    pub fn total_amount(&self) -> Cents {
        self.subtotal + self.delivery_fee + self.tax_amount
    }
}

//--------------------------------------     OrderItem       ---------------------------------------------------------
/// One purchased quantity of one catalog item. Owned exclusively by its order, created atomically with it and
/// never mutated afterwards. The unit price is a snapshot taken at order time, so later catalog price changes
/// never alter historical orders.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub catalog_item_id: i64,
    pub quantity: i64,
    pub unit_price: Cents,
    pub total_price: Cents,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub catalog_item_id: i64,
    pub quantity: i64,
    pub unit_price: Cents,
    /// Extended price, `quantity × unit_price`.
    pub total_price: Cents,
    pub note: Option<String>,
}

impl NewOrderItem {
    pub fn new(catalog_item_id: i64, quantity: i64, unit_price: Cents) -> Self {
        Self { catalog_item_id, quantity, unit_price, total_price: unit_price * quantity, note: None }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

//--------------------------------------   TrackingEvent     ---------------------------------------------------------
/// Append-only audit log entry for one order. Never updated or deleted; exactly one is written for every status
/// transition, including creation and cancellation. The sequence, ordered by creation time, is the authoritative
/// history of the order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: i64,
    pub order_id: i64,
    pub status: OrderStatus,
    pub message: String,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Payment        ---------------------------------------------------------
/// Processor-side payment state tied to exactly one order. At most one payment record per order is live at a
/// time; historical records accumulate across retries. Rows are never deleted, only marked `cancelled`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    /// The payment intent id assigned by the external processor. Unique.
    pub payment_intent_id: String,
    /// The hosted checkout session id, if a checkout flow was used. Unique when present.
    pub session_id: Option<String>,
    pub amount: Cents,
    pub currency: String,
    pub status: SettlementStatus,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub refund_amount: Option<Cents>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub payment_intent_id: String,
    pub session_id: Option<String>,
    pub amount: Cents,
    pub currency: String,
}

impl NewPayment {
    pub fn new(order_id: i64, payment_intent_id: impl Into<String>, amount: Cents, currency: impl Into<String>) -> Self {
        Self { order_id, payment_intent_id: payment_intent_id.into(), session_id: None, amount, currency: currency.into() }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

//--------------------------------------      Review         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub customer_id: i64,
    pub vendor_id: i64,
    pub order_id: Option<i64>,
    pub rating: i64,
    pub comment: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub customer_id: i64,
    pub vendor_id: i64,
    pub order_id: Option<i64>,
    pub rating: i64,
    pub comment: Option<String>,
}

impl NewReview {
    pub fn new(customer_id: i64, vendor_id: i64, rating: i64) -> Self {
        Self { customer_id, vendor_id, order_id: None, rating, comment: None }
    }

    pub fn for_order(mut self, order_id: i64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

//--------------------------------------   VendorRating      ---------------------------------------------------------
/// The materialized rating aggregate on the vendor row. Derived, never independently authoritative: the only
/// legitimate writer is the recomputation routine, which keeps it equal to the live average over verified
/// reviews (2-decimal rounding), or the (0, 0) floor when no verified reviews exist.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct VendorRating {
    pub vendor_id: i64,
    pub average_rating: f64,
    pub total_reviews: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_status_graph_edges() {
        use OrderStatus::*;
        let legal = [
            (Pending, Confirmed),
            (Confirmed, Preparing),
            (Preparing, Ready),
            (Ready, PickedUp),
            (PickedUp, Delivered),
            (Pending, Cancelled),
            (Confirmed, Cancelled),
        ];
        let all = [Pending, Confirmed, Preparing, Ready, PickedUp, Delivered, Cancelled];
        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        use OrderStatus::*;
        for to in [Pending, Confirmed, Preparing, Ready, PickedUp, Delivered, Cancelled] {
            assert!(!Delivered.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn settlement_rank_orders_stale_events() {
        use SettlementStatus::*;
        assert!(Succeeded.rank() > Pending.rank());
        assert!(Refunded.rank() > Succeeded.rank());
        // A "succeeded" notification arriving after a refund is stale.
        assert!(Succeeded.rank() <= Refunded.rank());
        // Succeeded and failed are mutually exclusive outcomes of the same rank.
        assert_eq!(Succeeded.rank(), Failed.rank());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in ["pending", "confirmed", "preparing", "ready", "picked_up", "delivered", "cancelled"] {
            assert_eq!(s.parse::<OrderStatus>().unwrap().to_string(), s);
        }
        for s in ["pending", "succeeded", "failed", "refunded", "cancelled"] {
            assert_eq!(s.parse::<SettlementStatus>().unwrap().to_string(), s);
        }
    }
}
