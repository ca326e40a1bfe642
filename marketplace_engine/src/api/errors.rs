use thiserror::Error;

use crate::{
    db_types::OrderStatus,
    traits::{LedgerError, ProcessorError},
};

/// Errors arising from the order placement and fulfilment flow.
#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("Invalid order: {0}")]
    Validation(String),
    #[error("Order id {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("The order changed while the update was in flight. Fetch it again and retry. {0}")]
    Conflict(String),
    #[error("Could not generate a unique order number")]
    OrderNumberExhausted,
    #[error("Storage error: {0}")]
    Persistence(String),
}

/// Errors arising from payment intent creation and processor event reconciliation.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("Event signature verification failed: {0}")]
    Authentication(String),
    #[error("No payment matches reference {0}")]
    PaymentNotFound(String),
    #[error("Order id {0} does not exist")]
    OrderNotFound(i64),
    #[error("Payment is not in a state that allows this operation: {0}")]
    InvalidState(String),
    #[error("Payment processor error: {0}")]
    Upstream(String),
    #[error("Storage error: {0}")]
    Persistence(String),
    #[error(transparent)]
    OrderFlow(#[from] OrderFlowError),
}

/// Errors arising from review submission and vendor rating maintenance.
#[derive(Debug, Error)]
pub enum RatingError {
    #[error("Review id {0} does not exist")]
    ReviewNotFound(i64),
    #[error("Customer {customer_id} has already reviewed order {order_id}")]
    DuplicateReview { customer_id: i64, order_id: i64 },
    #[error("Vendor id {0} does not exist")]
    VendorNotFound(i64),
    #[error("Invalid review: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Persistence(String),
}

impl From<LedgerError> for OrderFlowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::OrderNotFound(id) => Self::OrderNotFound(id),
            LedgerError::TransitionConflict { .. } => Self::Conflict(err.to_string()),
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for ReconciliationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::OrderNotFound(id) => Self::OrderNotFound(id),
            LedgerError::PaymentNotFound(id) => Self::PaymentNotFound(id.to_string()),
            LedgerError::TransitionConflict { .. } => Self::InvalidState(err.to_string()),
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<ProcessorError> for ReconciliationError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::InvalidSignature(reason) => Self::Authentication(reason),
            ProcessorError::MalformedEvent(reason) => Self::Authentication(reason),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<LedgerError> for RatingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ReviewNotFound(id) => Self::ReviewNotFound(id),
            LedgerError::DuplicateReview { customer_id, order_id } => Self::DuplicateReview { customer_id, order_id },
            LedgerError::VendorNotFound(id) => Self::VendorNotFound(id),
            other => Self::Persistence(other.to_string()),
        }
    }
}
