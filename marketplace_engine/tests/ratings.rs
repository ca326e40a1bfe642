mod support;

use marketplace_engine::{db_types::NewReview, MarketplaceDatabase, RatingApi, RatingError, SqliteDatabase};
use support::new_test_db;

async fn setup() -> (SqliteDatabase, RatingApi<SqliteDatabase>) {
    let db = new_test_db().await;
    db.ensure_vendor(7, "Blue Harbour Kitchen").await.expect("Error creating vendor");
    let api = RatingApi::new(db.clone());
    (db, api)
}

#[tokio::test]
async fn unverified_reviews_do_not_count() {
    let (_db, api) = setup().await;
    api.add_review(NewReview::new(1, 7, 5)).await.unwrap();
    api.add_review(NewReview::new(2, 7, 1)).await.unwrap();

    let rating = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(rating.total_reviews, 0);
    assert_eq!(rating.average_rating, 0.0);
}

#[tokio::test]
async fn verification_pulls_reviews_into_the_aggregate() {
    let (_db, api) = setup().await;
    let r1 = api.add_review(NewReview::new(1, 7, 5)).await.unwrap();
    let r2 = api.add_review(NewReview::new(2, 7, 4)).await.unwrap();
    let r3 = api.add_review(NewReview::new(3, 7, 2)).await.unwrap();

    api.set_verified(r1.id, true).await.unwrap();
    api.set_verified(r2.id, true).await.unwrap();
    let rating = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(rating.total_reviews, 2);
    assert_eq!(rating.average_rating, 4.5);

    // 5, 4, 2 → 3.666… rounds to 3.67.
    api.set_verified(r3.id, true).await.unwrap();
    let rating = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(rating.total_reviews, 3);
    assert_eq!(rating.average_rating, 3.67);

    // Un-verifying drops it back out.
    api.set_verified(r3.id, false).await.unwrap();
    let rating = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(rating.total_reviews, 2);
    assert_eq!(rating.average_rating, 4.5);
}

#[tokio::test]
async fn rating_updates_and_deletes_keep_the_aggregate_consistent() {
    let (_db, api) = setup().await;
    let r1 = api.add_review(NewReview::new(1, 7, 5)).await.unwrap();
    let r2 = api.add_review(NewReview::new(2, 7, 3)).await.unwrap();
    api.set_verified(r1.id, true).await.unwrap();
    api.set_verified(r2.id, true).await.unwrap();

    api.update_rating(r2.id, 1).await.unwrap();
    let rating = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(rating.average_rating, 3.0);

    api.delete_review(r2.id).await.unwrap();
    let rating = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(rating.total_reviews, 1);
    assert_eq!(rating.average_rating, 5.0);

    // Deleting the last verified review returns the aggregate to the floor, not NULL.
    api.delete_review(r1.id).await.unwrap();
    let rating = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(rating.total_reviews, 0);
    assert_eq!(rating.average_rating, 0.0);
}

#[tokio::test]
async fn recompute_is_idempotent() {
    let (_db, api) = setup().await;
    let r1 = api.add_review(NewReview::new(1, 7, 4)).await.unwrap();
    api.set_verified(r1.id, true).await.unwrap();

    let first = api.recompute_rating(7).await.unwrap();
    let second = api.recompute_rating(7).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.average_rating, 4.0);
    assert_eq!(first.total_reviews, 1);
}

#[tokio::test]
async fn recompute_repairs_a_drifted_aggregate() {
    let (db, api) = setup().await;
    let r1 = api.add_review(NewReview::new(1, 7, 4)).await.unwrap();
    api.set_verified(r1.id, true).await.unwrap();

    // Corrupt the stored aggregate behind the API's back.
    sqlx::query("UPDATE vendors SET average_rating = 99, total_reviews = 99 WHERE id = $1")
        .bind(7i64)
        .execute(db.pool())
        .await
        .unwrap();

    let repaired = api.recompute_rating(7).await.unwrap();
    assert_eq!(repaired.average_rating, 4.0);
    assert_eq!(repaired.total_reviews, 1);

    // The repair must be persisted, not just reported.
    let stored = api.vendor_rating(7).await.unwrap().unwrap();
    assert_eq!(stored.average_rating, 4.0);
    assert_eq!(stored.total_reviews, 1);
}

#[tokio::test]
async fn one_review_per_customer_per_order() {
    let (db, api) = setup().await;
    db.ensure_vendor(9, "Quay Street Deli").await.unwrap();

    // One review per order per customer.
    api.add_review(NewReview::new(1, 7, 5).for_order(1)).await.unwrap();
    let err = api.add_review(NewReview::new(1, 7, 3).for_order(1)).await.unwrap_err();
    assert!(matches!(err, RatingError::DuplicateReview { customer_id: 1, order_id: 1 }));

    // The same customer can review other orders, and other customers the same order.
    assert!(api.add_review(NewReview::new(1, 9, 4).for_order(2)).await.is_ok());
    assert!(api.add_review(NewReview::new(2, 7, 4).for_order(1)).await.is_ok());
}

#[tokio::test]
async fn validation_and_missing_rows() {
    let (_db, api) = setup().await;
    assert!(matches!(api.add_review(NewReview::new(1, 7, 0)).await.unwrap_err(), RatingError::Validation(_)));
    assert!(matches!(api.add_review(NewReview::new(1, 7, 6)).await.unwrap_err(), RatingError::Validation(_)));
    assert!(matches!(api.update_rating(99_999, 4).await.unwrap_err(), RatingError::ReviewNotFound(99_999)));
    assert!(matches!(api.delete_review(99_999).await.unwrap_err(), RatingError::ReviewNotFound(99_999)));
    assert!(matches!(api.recompute_rating(42).await.unwrap_err(), RatingError::VendorNotFound(42)));
}
