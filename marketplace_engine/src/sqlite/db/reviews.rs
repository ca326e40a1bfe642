use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewReview, Review, VendorRating},
    traits::LedgerError,
};

pub async fn insert_review(review: NewReview, conn: &mut SqliteConnection) -> Result<Review, LedgerError> {
    let (customer_id, order_id) = (review.customer_id, review.order_id);
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO reviews (customer_id, vendor_id, order_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(review.customer_id)
    .bind(review.vendor_id)
    .bind(review.order_id)
    .bind(review.rating)
    .bind(&review.comment)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::DuplicateReview { customer_id, order_id: order_id.unwrap_or_default() }
        },
        _ => LedgerError::from(e),
    })?;
    Ok(inserted)
}

pub async fn fetch_review(review_id: i64, conn: &mut SqliteConnection) -> Result<Option<Review>, LedgerError> {
    let review = sqlx::query_as("SELECT * FROM reviews WHERE id = $1").bind(review_id).fetch_optional(conn).await?;
    Ok(review)
}

pub async fn update_rating(review_id: i64, rating: i64, conn: &mut SqliteConnection) -> Result<Review, LedgerError> {
    let review =
        sqlx::query_as("UPDATE reviews SET rating = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(rating)
            .bind(review_id)
            .fetch_optional(conn)
            .await?
            .ok_or(LedgerError::ReviewNotFound(review_id))?;
    Ok(review)
}

pub async fn set_verified(review_id: i64, verified: bool, conn: &mut SqliteConnection) -> Result<Review, LedgerError> {
    let review =
        sqlx::query_as("UPDATE reviews SET verified = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(verified)
            .bind(review_id)
            .fetch_optional(conn)
            .await?
            .ok_or(LedgerError::ReviewNotFound(review_id))?;
    Ok(review)
}

pub async fn delete_review(review_id: i64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(review_id).execute(conn).await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::ReviewNotFound(review_id));
    }
    Ok(())
}

/// Materializes the vendor rating aggregate from the verified review set in a single statement. The aggregate
/// resets to the (0, 0) floor when no verified reviews remain. This is the only write path for these fields.
pub async fn recompute_vendor_rating(
    vendor_id: i64,
    conn: &mut SqliteConnection,
) -> Result<VendorRating, LedgerError> {
    let rating: VendorRating = sqlx::query_as(
        r#"
            UPDATE vendors
            SET average_rating = COALESCE(
                    (SELECT ROUND(AVG(rating), 2) FROM reviews WHERE vendor_id = $1 AND verified = TRUE), 0),
                total_reviews =
                    (SELECT COUNT(*) FROM reviews WHERE vendor_id = $1 AND verified = TRUE)
            WHERE id = $1
            RETURNING id as vendor_id, average_rating, total_reviews;
        "#,
    )
    .bind(vendor_id)
    .fetch_optional(conn)
    .await?
    .ok_or(LedgerError::VendorNotFound(vendor_id))?;
    debug!(
        "📝️ Vendor {vendor_id} rating recomputed: {:.2} over {} reviews",
        rating.average_rating, rating.total_reviews
    );
    Ok(rating)
}

pub async fn fetch_vendor_rating(
    vendor_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<VendorRating>, LedgerError> {
    let rating = sqlx::query_as("SELECT id as vendor_id, average_rating, total_reviews FROM vendors WHERE id = $1")
        .bind(vendor_id)
        .fetch_optional(conn)
        .await?;
    Ok(rating)
}

pub async fn ensure_vendor(vendor_id: i64, name: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("INSERT INTO vendors (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(vendor_id)
        .bind(name)
        .execute(conn)
        .await?;
    trace!("📝️ Vendor {vendor_id} present");
    Ok(())
}
