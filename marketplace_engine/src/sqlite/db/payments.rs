use log::debug;
use mp_common::Cents;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, Payment, SettlementStatus},
    traits::LedgerError,
};

pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, LedgerError> {
    let intent_id = payment.payment_intent_id.clone();
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, payment_intent_id, session_id, amount, currency)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(payment.order_id)
    .bind(payment.payment_intent_id)
    .bind(payment.session_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::PaymentAlreadyExists(intent_id),
        _ => LedgerError::from(e),
    })?;
    Ok(inserted)
}

pub async fn fetch_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(payment_id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_payment_by_intent(
    intent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE payment_intent_id = $1")
        .bind(intent_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_payment_by_session(
    session_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE session_id = $1").bind(session_id).fetch_optional(conn).await?;
    Ok(payment)
}

/// The most recent payment record for an order. Historical records accumulate across retries; only the latest
/// one is logically live.
pub async fn current_payment_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// Conditionally moves the payment from `expected` to `new_status`, recording the transaction id and payment
/// method when provided. Returns `None` if the payment was not in the expected status at update time, which is
/// how near-simultaneous duplicate notification deliveries are serialized.
pub async fn conditional_status_update(
    payment_id: i64,
    expected: SettlementStatus,
    new_status: SettlementStatus,
    transaction_id: Option<&str>,
    payment_method: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = $1,
                transaction_id = COALESCE($2, transaction_id),
                payment_method = COALESCE($3, payment_method),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(new_status)
    .bind(transaction_id)
    .bind(payment_method)
    .bind(payment_id)
    .bind(expected)
    .fetch_optional(conn)
    .await?;
    if payment.is_some() {
        debug!("📝️ Payment id {payment_id} moved {expected} → {new_status}");
    }
    Ok(payment)
}

/// Conditionally records a refund against a succeeded payment. The amount may be partial; it is not forced to
/// equal the original charge.
pub async fn conditional_refund(
    payment_id: i64,
    amount: Cents,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerError> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments
            SET status = 'refunded', refund_amount = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND status = 'succeeded'
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Administrative terminal marker. Payments are never deleted, only cancelled.
pub async fn cancel_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Payment, LedgerError> {
    let payment =
        sqlx::query_as("UPDATE payments SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP WHERE id = $1 RETURNING *")
            .bind(payment_id)
            .fetch_optional(conn)
            .await?
            .ok_or(LedgerError::PaymentNotFound(payment_id))?;
    Ok(payment)
}
