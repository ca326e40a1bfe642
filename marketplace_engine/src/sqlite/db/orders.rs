use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::{OrderQueryFilter, OrderStats},
    db_types::{NewOrder, NewOrderItem, Order, OrderItem, OrderNumber, OrderStatus, PaymentStatus},
    traits::LedgerError,
};

/// Inserts the order row. This is not atomic by itself. Embed this call inside a transaction together with
/// [`insert_order_items`] and the initial tracking event, passing `&mut *tx` as the connection argument.
pub async fn insert_order(
    order: &NewOrder,
    number: &OrderNumber,
    estimated_delivery_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerError> {
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO orders (
                customer_id,
                vendor_id,
                order_number,
                subtotal,
                delivery_fee,
                tax_amount,
                total_amount,
                payment_method,
                delivery_address,
                delivery_latitude,
                delivery_longitude,
                special_instructions,
                estimated_delivery_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(order.customer_id)
    .bind(order.vendor_id)
    .bind(number.as_str())
    .bind(order.subtotal)
    .bind(order.delivery_fee)
    .bind(order.tax_amount)
    .bind(order.total_amount())
    .bind(&order.payment_method)
    .bind(&order.delivery_address)
    .bind(order.delivery_latitude)
    .bind(order.delivery_longitude)
    .bind(&order.special_instructions)
    .bind(estimated_delivery_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::OrderNumberClash(number.clone()),
        _ => LedgerError::from(e),
    })?;
    Ok(inserted)
}

pub async fn insert_order_items(
    order_id: i64,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderItem>, LedgerError> {
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        let row: OrderItem = sqlx::query_as(
            r#"
                INSERT INTO order_items (order_id, catalog_item_id, quantity, unit_price, total_price, note)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *;
            "#,
        )
        .bind(order_id)
        .bind(item.catalog_item_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .bind(&item.note)
        .fetch_one(&mut *conn)
        .await?;
        result.push(row);
    }
    trace!("📝️ {} line items stored for order id {order_id}", result.len());
    Ok(result)
}

pub async fn fetch_order_by_id(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, LedgerError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_number(
    number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(number.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, LedgerError> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Conditionally moves the order from `expected` to `new_status`. Returns `None` if zero rows were affected,
/// i.e. the order was not in the expected status at update time. `delivered_at` is stamped iff the new status
/// is `delivered`.
pub async fn conditional_status_update(
    order_id: i64,
    expected: OrderStatus,
    new_status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let delivered_at = (new_status == OrderStatus::Delivered).then(Utc::now);
    let order = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = $1, delivered_at = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(new_status)
    .bind(delivered_at)
    .bind(order_id)
    .bind(expected)
    .fetch_optional(conn)
    .await?;
    if order.is_some() {
        debug!("📝️ Order id {order_id} moved {expected} → {new_status}");
    }
    Ok(order)
}

pub async fn update_payment_status(
    order_id: i64,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerError> {
    let order = sqlx::query_as(
        "UPDATE orders SET payment_status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(order_id)
    .fetch_optional(conn)
    .await?
    .ok_or(LedgerError::OrderNotFound(order_id))?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at`, newest first.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerError> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    push_filter(&mut builder, &query);
    builder.push(" ORDER BY created_at DESC, id DESC");
    if let Some(page_size) = query.page_size {
        let offset = i64::from(query.page.unwrap_or(0)) * i64::from(page_size);
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(page_size));
        builder.push(" OFFSET ");
        builder.push_bind(offset);
    }
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {} rows", orders.len());
    Ok(orders)
}

/// Aggregate statistics over the orders selected by the filter. Pagination fields are ignored.
pub async fn order_stats(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<OrderStats, LedgerError> {
    let mut builder = QueryBuilder::new(
        r#"
        SELECT
            COUNT(*) as total_orders,
            COUNT(CASE WHEN status = 'pending' THEN 1 END) as pending_orders,
            COUNT(CASE WHEN status = 'confirmed' THEN 1 END) as confirmed_orders,
            COUNT(CASE WHEN status = 'preparing' THEN 1 END) as preparing_orders,
            COUNT(CASE WHEN status = 'ready' THEN 1 END) as ready_orders,
            COUNT(CASE WHEN status = 'picked_up' THEN 1 END) as picked_up_orders,
            COUNT(CASE WHEN status = 'delivered' THEN 1 END) as delivered_orders,
            COUNT(CASE WHEN status = 'cancelled' THEN 1 END) as cancelled_orders,
            COUNT(CASE WHEN payment_status = 'paid' THEN 1 END) as paid_orders,
            COALESCE(SUM(CASE WHEN status = 'delivered' THEN total_amount END), 0) as total_revenue,
            CAST(COALESCE(AVG(CASE WHEN status = 'delivered' THEN total_amount END), 0) AS INTEGER)
                as average_order_value
        FROM orders "#,
    );
    push_filter(&mut builder, &query);
    let stats = builder.build_query_as::<OrderStats>().fetch_one(conn).await?;
    Ok(stats)
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, sqlx::Sqlite>, query: &'a OrderQueryFilter) {
    if query.is_empty() {
        return;
    }
    builder.push("WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(customer_id) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(customer_id);
    }
    if let Some(vendor_id) = query.vendor_id {
        where_clause.push("vendor_id = ");
        where_clause.push_bind_unseparated(vendor_id);
    }
    if !query.statuses.is_empty() {
        let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(status) = query.payment_status {
        where_clause.push("payment_status = ");
        where_clause.push_bind_unseparated(status);
    }
    // created_at is written by CURRENT_TIMESTAMP, so range bounds are bound in the same naive format.
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since.naive_utc());
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until.naive_utc());
    }
}
