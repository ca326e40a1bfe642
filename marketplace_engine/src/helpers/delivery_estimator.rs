use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Produces the estimated delivery timestamp stamped onto a new order.
///
/// The estimate is advisory only; nothing downstream enforces it. Implementations decide how much context they
/// need, which is why the whole order is not passed in.
pub trait DeliveryEstimator: Clone + Send + Sync {
    fn estimate(&self, placed_at: DateTime<Utc>) -> DateTime<Utc>;
}

/// The default estimator: a uniformly random 30 to 45 minute window from the placement time.
#[derive(Debug, Clone, Default)]
pub struct RandomizedEstimator;

impl DeliveryEstimator for RandomizedEstimator {
    fn estimate(&self, placed_at: DateTime<Utc>) -> DateTime<Utc> {
        let minutes = rand::thread_rng().gen_range(30..=45);
        placed_at + Duration::minutes(minutes)
    }
}

/// Deterministic estimator, for tests and for deployments with a contractual delivery window.
#[derive(Debug, Clone)]
pub struct FixedEstimator(pub Duration);

impl DeliveryEstimator for FixedEstimator {
    fn estimate(&self, placed_at: DateTime<Utc>) -> DateTime<Utc> {
        placed_at + self.0
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::{DeliveryEstimator, FixedEstimator, RandomizedEstimator};

    #[test]
    fn randomized_estimate_stays_in_window() {
        let now = Utc::now();
        for _ in 0..50 {
            let eta = RandomizedEstimator.estimate(now);
            let offset = eta - now;
            assert!(offset >= Duration::minutes(30));
            assert!(offset <= Duration::minutes(45));
        }
    }

    #[test]
    fn fixed_estimate() {
        let now = Utc::now();
        let eta = FixedEstimator(Duration::minutes(40)).estimate(now);
        assert_eq!(eta - now, Duration::minutes(40));
    }
}
