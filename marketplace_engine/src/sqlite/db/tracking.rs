use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderStatus, TrackingEvent},
    traits::LedgerError,
};

/// Appends one tracking event. The log is append-only; there are no update or delete paths.
pub async fn append_event(
    order_id: i64,
    status: OrderStatus,
    message: &str,
    conn: &mut SqliteConnection,
) -> Result<TrackingEvent, LedgerError> {
    let event = sqlx::query_as(
        r#"
            INSERT INTO order_tracking (order_id, status, message)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(status)
    .bind(message)
    .fetch_one(conn)
    .await?;
    trace!("📝️ Tracking event '{status}' appended for order id {order_id}");
    Ok(event)
}

/// The full tracking log for an order, oldest entry first. This sequence reconstructs the order's status
/// progression.
pub async fn events_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<TrackingEvent>, LedgerError> {
    let events = sqlx::query_as("SELECT * FROM order_tracking WHERE order_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(events)
}
