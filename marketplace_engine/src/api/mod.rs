mod errors;
pub mod order_objects;
mod order_flow_api;
mod rating_api;
mod reconciliation_api;

pub use errors::{OrderFlowError, RatingError, ReconciliationError};
pub use order_flow_api::OrderFlowApi;
pub use rating_api::RatingApi;
pub use reconciliation_api::{ReconciliationApi, SettlementOutcome};
