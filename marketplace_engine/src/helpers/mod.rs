mod delivery_estimator;
mod order_number;

pub use delivery_estimator::{DeliveryEstimator, FixedEstimator, RandomizedEstimator};
pub use order_number::generate_order_number;
