use std::fmt::Debug;

use log::*;

use crate::{
    api::errors::RatingError,
    db_types::{NewReview, Review, VendorRating},
    traits::MarketplaceDatabase,
};

/// `RatingApi` manages customer reviews and keeps the vendor's materialized rating aggregate consistent.
///
/// Every mutation that can change the verified review set recomputes the aggregate in the same transaction, so
/// the stored average and count never drift from the live review data.
pub struct RatingApi<B> {
    db: B,
}

impl<B> Debug for RatingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RatingApi")
    }
}

impl<B> RatingApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> RatingApi<B>
where B: MarketplaceDatabase
{
    /// Submits a new review. One review per customer per order; a duplicate is rejected.
    pub async fn add_review(&self, review: NewReview) -> Result<Review, RatingError> {
        validate_rating(review.rating)?;
        let review = self.db.insert_review(review).await?;
        debug!("🔄️⭐️ Review {} added for vendor {} (rating {})", review.id, review.vendor_id, review.rating);
        Ok(review)
    }

    /// Changes the rating on an existing review. The vendor aggregate follows in the same transaction.
    pub async fn update_rating(&self, review_id: i64, rating: i64) -> Result<Review, RatingError> {
        validate_rating(rating)?;
        let review = self.db.update_review_rating(review_id, rating).await?;
        debug!("🔄️⭐️ Review {review_id} rating changed to {rating}");
        Ok(review)
    }

    /// Marks a review as verified (or reverts it). Only verified reviews count towards the vendor aggregate.
    pub async fn set_verified(&self, review_id: i64, verified: bool) -> Result<Review, RatingError> {
        let review = self.db.set_review_verified(review_id, verified).await?;
        debug!("🔄️⭐️ Review {review_id} verified flag set to {verified}");
        Ok(review)
    }

    /// Removes a review. The vendor aggregate is recomputed in the same transaction.
    pub async fn delete_review(&self, review_id: i64) -> Result<(), RatingError> {
        self.db.delete_review(review_id).await?;
        debug!("🔄️⭐️ Review {review_id} deleted");
        Ok(())
    }

    pub async fn fetch_review(&self, review_id: i64) -> Result<Option<Review>, RatingError> {
        let review = self.db.fetch_review(review_id).await?;
        Ok(review)
    }

    /// Forces a recomputation of the vendor aggregate. Idempotent; useful after bulk imports or repairs.
    pub async fn recompute_rating(&self, vendor_id: i64) -> Result<VendorRating, RatingError> {
        let rating = self.db.recompute_vendor_rating(vendor_id).await?;
        debug!(
            "🔄️⭐️ Vendor {} aggregate recomputed: {} over {} reviews",
            rating.vendor_id, rating.average_rating, rating.total_reviews
        );
        Ok(rating)
    }

    pub async fn vendor_rating(&self, vendor_id: i64) -> Result<Option<VendorRating>, RatingError> {
        let rating = self.db.fetch_vendor_rating(vendor_id).await?;
        Ok(rating)
    }
}

fn validate_rating(rating: i64) -> Result<(), RatingError> {
    if !(1..=5).contains(&rating) {
        return Err(RatingError::Validation(format!("Rating must be between 1 and 5, got {rating}")));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::validate_rating;

    #[test]
    fn rating_bounds() {
        for r in 1..=5 {
            assert!(validate_rating(r).is_ok());
        }
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert!(validate_rating(-3).is_err());
    }
}
