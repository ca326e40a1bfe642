use mp_common::Cents;
use thiserror::Error;

use crate::{
    api::order_objects::{OrderQueryFilter, OrderStats},
    db_types::{
        NewOrder,
        NewPayment,
        NewReview,
        Order,
        OrderItem,
        OrderNumber,
        OrderStatus,
        Payment,
        PaymentStatus,
        Review,
        SettlementStatus,
        TrackingEvent,
        VendorRating,
    },
};

/// The storage contract for the marketplace ledger.
///
/// Implementations must provide atomic multi-statement transactions with guaranteed rollback on any failure
/// path: every method that writes more than one row performs all of its writes inside a single transaction, and
/// a failure at any step leaves no partial state observable.
///
/// Per-row serialization is achieved with conditional updates (`UPDATE ... WHERE status = expected`) rather
/// than application-level locks; a zero-rows-affected result surfaces as [`LedgerError::TransitionConflict`],
/// which callers treat as a concurrent-modification conflict.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    //----------------------------------------- Orders -----------------------------------------

    /// Writes the order, all of its line items, and the initial `pending` tracking event in one transaction.
    ///
    /// The order number must be freshly generated by the caller; a clash with an existing number fails the
    /// whole transaction with [`LedgerError::OrderNumberClash`] so the caller can retry with a new number.
    async fn insert_full_order(
        &self,
        order: NewOrder,
        order_number: OrderNumber,
        estimated_delivery_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Order, LedgerError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError>;

    /// Filtered, paginated order scan. Results are ordered newest-first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerError>;

    /// Conditionally transitions the order from `expected` to `new_status`, appends exactly one tracking event,
    /// and stamps `delivered_at` iff the new status is `Delivered`. All in one transaction.
    ///
    /// Returns [`LedgerError::TransitionConflict`] if the order's status was no longer `expected` at update
    /// time, which is how concurrent transitions on the same order are serialized.
    async fn transition_order_status(
        &self,
        order_id: i64,
        expected: OrderStatus,
        new_status: OrderStatus,
        message: String,
    ) -> Result<Order, LedgerError>;

    /// The ordered tracking-event sequence for an order, oldest first.
    async fn tracking_for_order(&self, order_id: i64) -> Result<Vec<TrackingEvent>, LedgerError>;

    /// Aggregate order statistics for the given filter (status counts, delivered revenue).
    async fn order_stats(&self, query: OrderQueryFilter) -> Result<OrderStats, LedgerError>;

    //---------------------------------------- Payments ----------------------------------------

    /// Persists a freshly minted payment intent as a `pending` payment row. The external call to the processor
    /// must already have succeeded; this method must never be called speculatively.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerError>;

    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, LedgerError>;

    async fn fetch_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, LedgerError>;

    async fn fetch_payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, LedgerError>;

    /// The most recent payment record for the order, i.e. the logically "live" one.
    async fn current_payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, LedgerError>;

    /// Settles a payment in one transaction: conditionally transitions the payment row from `expected` to
    /// `outcome`, records the transaction id and payment method reported by the processor, updates the order's
    /// payment status and, on success, advances a still-`pending` order to `confirmed` with a tracking event.
    ///
    /// Returns the updated payment and order. A zero-rows conditional update surfaces as
    /// [`LedgerError::TransitionConflict`], which is how duplicate near-simultaneous webhook deliveries for the
    /// same intent are serialized.
    async fn settle_payment(
        &self,
        payment_id: i64,
        expected: SettlementStatus,
        outcome: SettlementStatus,
        transaction_id: Option<String>,
        payment_method: Option<String>,
    ) -> Result<(Payment, Order), LedgerError>;

    /// Records a refund in one transaction: payment goes `succeeded → refunded` (conditionally) with the
    /// refunded amount, and the order's payment status follows.
    async fn record_refund(&self, payment_id: i64, amount: Cents) -> Result<(Payment, Order), LedgerError>;

    /// Administrative terminal marker. Payments are never deleted.
    async fn cancel_payment(&self, payment_id: i64) -> Result<Payment, LedgerError>;

    //---------------------------------------- Reviews -----------------------------------------

    /// Inserts a review and recomputes the vendor aggregate in the same transaction.
    async fn insert_review(&self, review: NewReview) -> Result<Review, LedgerError>;

    async fn fetch_review(&self, review_id: i64) -> Result<Option<Review>, LedgerError>;

    /// Updates the rating value and recomputes the vendor aggregate in the same transaction.
    async fn update_review_rating(&self, review_id: i64, rating: i64) -> Result<Review, LedgerError>;

    /// Flips the verified flag and recomputes the vendor aggregate in the same transaction.
    async fn set_review_verified(&self, review_id: i64, verified: bool) -> Result<Review, LedgerError>;

    /// Deletes the review and recomputes the vendor aggregate in the same transaction.
    async fn delete_review(&self, review_id: i64) -> Result<(), LedgerError>;

    /// Recomputes the vendor's materialized aggregate from the verified review set. Idempotent; this is the
    /// only write path for the aggregate fields.
    async fn recompute_vendor_rating(&self, vendor_id: i64) -> Result<VendorRating, LedgerError>;

    async fn fetch_vendor_rating(&self, vendor_id: i64) -> Result<Option<VendorRating>, LedgerError>;

    /// Creates the vendor row if it does not exist yet. The rating aggregate starts at the (0, 0) floor.
    async fn ensure_vendor(&self, vendor_id: i64, name: &str) -> Result<(), LedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Internal database engine error: {0}")]
    DatabaseError(String),
    #[error("The generated order number {0} already exists")]
    OrderNumberClash(OrderNumber),
    #[error("A payment for intent {0} already exists")]
    PaymentAlreadyExists(String),
    #[error("The requested order (id {0}) does not exist")]
    OrderNotFound(i64),
    #[error("The requested payment (id {0}) does not exist")]
    PaymentNotFound(i64),
    #[error("The requested review (id {0}) does not exist")]
    ReviewNotFound(i64),
    #[error("Customer {customer_id} has already reviewed order {order_id}")]
    DuplicateReview { customer_id: i64, order_id: i64 },
    #[error("The requested vendor (id {0}) does not exist")]
    VendorNotFound(i64),
    #[error("Conditional update applied to zero rows: {entity} {id} was not in status '{expected}'")]
    TransitionConflict { entity: &'static str, id: i64, expected: String },
    #[error("Order payment status could not be set to {0}")]
    PaymentStatusUpdateError(PaymentStatus),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
