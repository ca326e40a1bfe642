//! `SqliteDatabase` is the concrete SQLite implementation of the [`MarketplaceDatabase`] storage contract.
//!
//! All multi-row writes (order + items + tracking event, payment settlement + order advance, review mutation +
//! aggregate recompute) run inside a single transaction, so a failure at any step rolls the whole operation
//! back and no partial state is ever observable.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use mp_common::Cents;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, orders, payments, reviews, tracking};
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
    traits::{LedgerError, MarketplaceDatabase},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, LedgerError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_full_order(
        &self,
        order: NewOrder,
        order_number: OrderNumber,
        estimated_delivery_at: DateTime<Utc>,
    ) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_order(&order, &order_number, estimated_delivery_at, &mut tx).await?;
        orders::insert_order_items(inserted.id, &order.items, &mut tx).await?;
        tracking::append_event(inserted.id, OrderStatus::Pending, "Order placed successfully", &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", inserted.order_number, inserted.id);
        Ok(inserted)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(order_id, &mut conn).await
    }

    async fn fetch_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_number(number, &mut conn).await
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_items(order_id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(query, &mut conn).await
    }

    async fn transition_order_status(
        &self,
        order_id: i64,
        expected: OrderStatus,
        new_status: OrderStatus,
        message: String,
    ) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::conditional_status_update(order_id, expected, new_status, &mut tx).await?.ok_or(
            LedgerError::TransitionConflict { entity: "order", id: order_id, expected: expected.to_string() },
        )?;
        tracking::append_event(order_id, new_status, &message, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn tracking_for_order(&self, order_id: i64) -> Result<Vec<TrackingEvent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        tracking::events_for_order(order_id, &mut conn).await
    }

    async fn order_stats(&self, query: OrderQueryFilter) -> Result<OrderStats, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::order_stats(query, &mut conn).await
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment intent {} stored with id {} for order id {}", payment.payment_intent_id, payment.id, payment.order_id);
        Ok(payment)
    }

    async fn fetch_payment(&self, payment_id: i64) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(payment_id, &mut conn).await
    }

    async fn fetch_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_intent(intent_id, &mut conn).await
    }

    async fn fetch_payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_session(session_id, &mut conn).await
    }

    async fn current_payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::current_payment_for_order(order_id, &mut conn).await
    }

    async fn settle_payment(
        &self,
        payment_id: i64,
        expected: SettlementStatus,
        outcome: SettlementStatus,
        transaction_id: Option<String>,
        payment_method: Option<String>,
    ) -> Result<(Payment, Order), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::conditional_status_update(
            payment_id,
            expected,
            outcome,
            transaction_id.as_deref(),
            payment_method.as_deref(),
            &mut tx,
        )
        .await?
        .ok_or(LedgerError::TransitionConflict {
            entity: "payment",
            id: payment_id,
            expected: expected.to_string(),
        })?;
        let order_payment_status = match outcome {
            SettlementStatus::Succeeded => PaymentStatus::Paid,
            SettlementStatus::Failed => PaymentStatus::Failed,
            other => return Err(LedgerError::PaymentStatusUpdateError(map_settlement(other))),
        };
        let mut order = orders::fetch_order_by_id(payment.order_id, &mut tx)
            .await?
            .ok_or(LedgerError::OrderNotFound(payment.order_id))?;
        if order.payment_status == PaymentStatus::Refunded {
            // A newer payment settled and was refunded in the meantime. Record the settlement on this row but
            // leave the order's refunded state alone.
            warn!(
                "🗃️ Late settlement on payment id {payment_id}; order {} has since been refunded",
                order.order_number
            );
        } else {
            order = orders::update_payment_status(payment.order_id, order_payment_status, &mut tx).await?;
            if outcome == SettlementStatus::Succeeded && order.status == OrderStatus::Pending {
                // The vendor may have confirmed concurrently; a conflict here just means there is nothing to advance.
                if let Some(advanced) =
                    orders::conditional_status_update(order.id, OrderStatus::Pending, OrderStatus::Confirmed, &mut tx)
                        .await?
                {
                    tracking::append_event(order.id, OrderStatus::Confirmed, "Payment received", &mut tx).await?;
                    order = advanced;
                }
            }
        }
        tx.commit().await?;
        debug!("🗃️ Payment id {payment_id} settled as {outcome}. Order {} payment status is now {}", order.order_number, order.payment_status);
        Ok((payment, order))
    }

    async fn record_refund(&self, payment_id: i64, amount: Cents) -> Result<(Payment, Order), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::conditional_refund(payment_id, amount, &mut tx).await?.ok_or(
            LedgerError::TransitionConflict {
                entity: "payment",
                id: payment_id,
                expected: SettlementStatus::Succeeded.to_string(),
            },
        )?;
        let order = orders::update_payment_status(payment.order_id, PaymentStatus::Refunded, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Refund of {amount} recorded against payment id {payment_id}");
        Ok((payment, order))
    }

    async fn cancel_payment(&self, payment_id: i64) -> Result<Payment, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::cancel_payment(payment_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment id {payment_id} marked cancelled");
        Ok(payment)
    }

    async fn insert_review(&self, review: NewReview) -> Result<Review, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let review = reviews::insert_review(review, &mut tx).await?;
        reviews::recompute_vendor_rating(review.vendor_id, &mut tx).await?;
        tx.commit().await?;
        Ok(review)
    }

    async fn fetch_review(&self, review_id: i64) -> Result<Option<Review>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        reviews::fetch_review(review_id, &mut conn).await
    }

    async fn update_review_rating(&self, review_id: i64, rating: i64) -> Result<Review, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let review = reviews::update_rating(review_id, rating, &mut tx).await?;
        reviews::recompute_vendor_rating(review.vendor_id, &mut tx).await?;
        tx.commit().await?;
        Ok(review)
    }

    async fn set_review_verified(&self, review_id: i64, verified: bool) -> Result<Review, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let review = reviews::set_verified(review_id, verified, &mut tx).await?;
        reviews::recompute_vendor_rating(review.vendor_id, &mut tx).await?;
        tx.commit().await?;
        Ok(review)
    }

    async fn delete_review(&self, review_id: i64) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let review =
            reviews::fetch_review(review_id, &mut tx).await?.ok_or(LedgerError::ReviewNotFound(review_id))?;
        reviews::delete_review(review_id, &mut tx).await?;
        reviews::recompute_vendor_rating(review.vendor_id, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn recompute_vendor_rating(&self, vendor_id: i64) -> Result<VendorRating, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let rating = reviews::recompute_vendor_rating(vendor_id, &mut tx).await?;
        tx.commit().await?;
        Ok(rating)
    }

    async fn fetch_vendor_rating(&self, vendor_id: i64) -> Result<Option<VendorRating>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        reviews::fetch_vendor_rating(vendor_id, &mut conn).await
    }

    async fn ensure_vendor(&self, vendor_id: i64, name: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        reviews::ensure_vendor(vendor_id, name, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

fn map_settlement(status: SettlementStatus) -> PaymentStatus {
    match status {
        SettlementStatus::Succeeded => PaymentStatus::Paid,
        SettlementStatus::Failed => PaymentStatus::Failed,
        SettlementStatus::Refunded => PaymentStatus::Refunded,
        SettlementStatus::Pending | SettlementStatus::Cancelled => PaymentStatus::Pending,
    }
}
