//! An in-memory [`PaymentProcessor`] for tests.
//!
//! Intents are minted with deterministic ids and their outcomes are scripted by the test. Notification payloads
//! are plain JSON and the "signature" is an exact match against [`TEST_SIGNING_KEY`], so tests can exercise both
//! the accept and reject paths without real cryptography.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use mp_common::Cents;
use serde::{Deserialize, Serialize};

use crate::traits::{
    IntentRef,
    NewIntentRequest,
    PaymentProcessor,
    ProcessorError,
    ProcessorEvent,
    ProcessorEventKind,
    ProcessorIntent,
};

pub const TEST_SIGNING_KEY: &str = "test-signing-key";

#[derive(Clone, Default)]
pub struct MockProcessor {
    intents: Arc<Mutex<HashMap<String, ProcessorIntent>>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the outcome that `retrieve_intent` will report for the given intent.
    pub fn set_outcome(&self, intent_id: &str, outcome: ProcessorEventKind) {
        let mut intents = self.intents.lock().unwrap();
        if let Some(intent) = intents.get_mut(intent_id) {
            intent.outcome = Some(outcome);
        }
    }

    /// Builds a signed notification payload for [`PaymentProcessor::verify_event`].
    pub fn notification(reference: IntentRef, kind: ProcessorEventKind) -> (Vec<u8>, String) {
        let (intent_id, session_id) = match reference {
            IntentRef::Intent(id) => (Some(id), None),
            IntentRef::Session(id) => (None, Some(id)),
        };
        let wire = match kind {
            ProcessorEventKind::Succeeded { transaction_id, payment_method, amount } => WireEvent {
                intent_id,
                session_id,
                outcome: "succeeded".to_string(),
                transaction_id,
                payment_method,
                amount: Some(amount.value()),
                reason: None,
            },
            ProcessorEventKind::Failed { reason } => WireEvent {
                intent_id,
                session_id,
                outcome: "failed".to_string(),
                transaction_id: None,
                payment_method: None,
                amount: None,
                reason,
            },
        };
        let payload = serde_json::to_vec(&wire).unwrap();
        (payload, TEST_SIGNING_KEY.to_string())
    }
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    intent_id: Option<String>,
    session_id: Option<String>,
    outcome: String,
    transaction_id: Option<String>,
    payment_method: Option<String>,
    amount: Option<i64>,
    reason: Option<String>,
}

impl PaymentProcessor for MockProcessor {
    async fn create_intent(&self, request: NewIntentRequest) -> Result<ProcessorIntent, ProcessorError> {
        let intent_id = format!("pi_test_{}", request.order_id);
        let intent = ProcessorIntent {
            intent_id: intent_id.clone(),
            session_id: Some(format!("cs_test_{}", request.order_id)),
            amount: request.amount,
            currency: request.currency,
            outcome: None,
        };
        self.intents.lock().unwrap().insert(intent_id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| ProcessorError::Upstream(format!("No such intent: {intent_id}")))
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<ProcessorEvent, ProcessorError> {
        if signature != TEST_SIGNING_KEY {
            return Err(ProcessorError::InvalidSignature("Signature mismatch".to_string()));
        }
        let wire: WireEvent =
            serde_json::from_slice(payload).map_err(|e| ProcessorError::MalformedEvent(e.to_string()))?;
        let reference = match (wire.intent_id, wire.session_id) {
            (Some(id), _) => IntentRef::Intent(id),
            (None, Some(id)) => IntentRef::Session(id),
            (None, None) => return Err(ProcessorError::MalformedEvent("No payment reference".to_string())),
        };
        let kind = match wire.outcome.as_str() {
            "succeeded" => ProcessorEventKind::Succeeded {
                transaction_id: wire.transaction_id,
                payment_method: wire.payment_method,
                amount: Cents::from(wire.amount.unwrap_or_default()),
            },
            "failed" => ProcessorEventKind::Failed { reason: wire.reason },
            other => return Err(ProcessorError::MalformedEvent(format!("Unknown outcome: {other}"))),
        };
        Ok(ProcessorEvent { reference, kind })
    }
}
