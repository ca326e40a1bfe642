use mp_common::Cents;
use thiserror::Error;

use crate::db_types::OrderNumber;

/// Client contract for the external payment processor.
///
/// The engine only ever talks to the processor through this trait: minting an intent before persisting a local
/// payment row, re-querying intent state for the synchronous confirmation path, and verifying the signature on
/// asynchronous notification deliveries. Implementations must bound their calls with a timeout; a timed-out
/// call is an [`ProcessorError::Upstream`] failure, never an ambiguous pending state.
#[allow(async_fn_in_trait)]
pub trait PaymentProcessor: Clone {
    /// Mints a payment intent (and optionally a hosted checkout session) for the given amount in minor units.
    async fn create_intent(&self, request: NewIntentRequest) -> Result<ProcessorIntent, ProcessorError>;

    /// Retrieves the current processor-side state of an intent.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError>;

    /// Verifies `signature` against the exact raw payload bytes using the pre-shared webhook secret and, only
    /// if verification succeeds, parses the payload into a [`ProcessorEvent`].
    ///
    /// An unverified payload must never be parsed into an event. Verification failures are terminal for the
    /// delivery; the processor's own retry mechanism is relied upon for redelivery.
    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<ProcessorEvent, ProcessorError>;
}

#[derive(Debug, Clone)]
pub struct NewIntentRequest {
    pub order_id: i64,
    pub order_number: OrderNumber,
    /// Amount in minor currency units, as the processor expects.
    pub amount: Cents,
    pub currency: String,
}

/// Processor-side view of a payment intent.
#[derive(Debug, Clone)]
pub struct ProcessorIntent {
    pub intent_id: String,
    pub session_id: Option<String>,
    pub amount: Cents,
    pub currency: String,
    pub outcome: Option<ProcessorEventKind>,
}

/// Identifies the local payment record a notification refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentRef {
    Intent(String),
    Session(String),
}

impl std::fmt::Display for IntentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentRef::Intent(id) => write!(f, "intent {id}"),
            IntentRef::Session(id) => write!(f, "session {id}"),
        }
    }
}

/// A verified, parsed notification from the processor.
#[derive(Debug, Clone)]
pub struct ProcessorEvent {
    pub reference: IntentRef,
    pub kind: ProcessorEventKind,
}

#[derive(Debug, Clone)]
pub enum ProcessorEventKind {
    Succeeded {
        transaction_id: Option<String>,
        payment_method: Option<String>,
        /// The amount the processor reports as captured, in minor units.
        amount: Cents,
    },
    Failed {
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("Could not initialize processor client: {0}")]
    Initialization(String),
    #[error("Processor call failed: {0}")]
    Upstream(String),
    #[error("Notification signature verification failed: {0}")]
    InvalidSignature(String),
    #[error("Could not parse notification payload: {0}")]
    MalformedEvent(String),
}
