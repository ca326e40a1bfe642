use std::fmt::Debug;

use log::*;
use mp_common::Cents;

use crate::{
    api::errors::ReconciliationError,
    db_types::{NewPayment, Order, Payment, PaymentStatus, SettlementStatus},
    events::{EventProducers, OrderPaidEvent},
    traits::{
        IntentRef,
        LedgerError,
        MarketplaceDatabase,
        NewIntentRequest,
        PaymentProcessor,
        ProcessorEvent,
        ProcessorEventKind,
    },
};

/// The result of applying a processor notification to a payment record.
///
/// Only `Applied` means state changed. `AlreadyApplied` and `Stale` are successful no-ops so that the processor
/// receives an acknowledgement and stops redelivering; at-least-once delivery makes both cases routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// The notification produced a genuine state transition.
    Applied,
    /// The payment was already in the notified state. Duplicate delivery.
    AlreadyApplied,
    /// The payment has progressed past the notified state. Out-of-order delivery.
    Stale,
}

/// `ReconciliationApi` owns the money axis: minting payment intents against the external processor and folding
/// the processor's asynchronous notifications back into local payment state, idempotently.
pub struct ReconciliationApi<B, P> {
    db: B,
    processor: P,
    producers: EventProducers,
}

impl<B, P> Debug for ReconciliationApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B, P> ReconciliationApi<B, P> {
    pub fn new(db: B, processor: P, producers: EventProducers) -> Self {
        Self { db, processor, producers }
    }
}

impl<B, P> ReconciliationApi<B, P>
where
    B: MarketplaceDatabase,
    P: PaymentProcessor,
{
    /// Mints a payment intent with the external processor and records it locally as a `pending` payment.
    ///
    /// The external call happens first. If it fails, no local row is written and the caller simply retries; if
    /// it succeeds but the local write fails, the orphaned intent is harmless (it expires processor-side) and a
    /// retry mints a fresh one. There is never a local payment without a corresponding processor intent.
    pub async fn create_payment_intent(&self, order_id: i64) -> Result<Payment, ReconciliationError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(ReconciliationError::OrderNotFound(order_id))?;
        if order.payment_status == PaymentStatus::Paid {
            return Err(ReconciliationError::InvalidState(format!(
                "Order {} has already been paid",
                order.order_number
            )));
        }
        let request = NewIntentRequest {
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount: order.total_amount,
            currency: mp_common::DEFAULT_CURRENCY.to_string(),
        };
        let intent = self.processor.create_intent(request).await?;
        let mut new_payment =
            NewPayment::new(order.id, intent.intent_id.clone(), order.total_amount, intent.currency);
        if let Some(session_id) = intent.session_id {
            new_payment = new_payment.with_session(session_id);
        }
        let payment = match self.db.insert_payment(new_payment).await {
            Ok(p) => p,
            Err(LedgerError::PaymentAlreadyExists(id)) => {
                // The processor minted a duplicate intent id, or a concurrent request won the race. Either way
                // the existing row is authoritative.
                warn!("🔄️💳️ Payment intent {id} already recorded for order {}", order.order_number);
                self.db
                    .fetch_payment_by_intent(&id)
                    .await?
                    .ok_or_else(|| ReconciliationError::PaymentNotFound(id))?
            },
            Err(e) => return Err(e.into()),
        };
        debug!(
            "🔄️💳️ Payment intent {} created for order {} ({})",
            payment.payment_intent_id, order.order_number, payment.amount
        );
        Ok(payment)
    }

    /// Verifies and applies an asynchronous processor notification.
    ///
    /// The raw payload is verified against `signature` before any parsing; an unverifiable delivery is rejected
    /// outright. Verified events are applied idempotently: duplicates and out-of-order deliveries return
    /// [`SettlementOutcome::AlreadyApplied`] / [`SettlementOutcome::Stale`] without touching state, so the
    /// processor's redelivery loop always converges.
    pub async fn apply_notification(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<SettlementOutcome, ReconciliationError> {
        let event = self.processor.verify_event(payload, signature)?;
        self.apply_processor_event(event).await
    }

    /// Applies an already-verified processor event. Split out so the synchronous confirmation path can reuse it.
    pub async fn apply_processor_event(&self, event: ProcessorEvent) -> Result<SettlementOutcome, ReconciliationError> {
        let payment = self.fetch_payment_for(&event.reference).await?;
        let target = match &event.kind {
            ProcessorEventKind::Succeeded { .. } => SettlementStatus::Succeeded,
            ProcessorEventKind::Failed { .. } => SettlementStatus::Failed,
        };
        // At-least-once delivery means duplicates and reordered events are routine, not errors. Rank comparison
        // decides which deliveries still carry information.
        if payment.status == target {
            debug!("🔄️💳️ Duplicate notification for {}; payment already {target}", event.reference);
            return Ok(SettlementOutcome::AlreadyApplied);
        }
        if payment.status.rank() >= target.rank() {
            info!(
                "🔄️💳️ Stale notification for {}: payment is {} but the event asserts {target}",
                event.reference, payment.status
            );
            return Ok(SettlementOutcome::Stale);
        }
        let (transaction_id, payment_method) = match event.kind {
            ProcessorEventKind::Succeeded { transaction_id, payment_method, amount } => {
                if amount != payment.amount {
                    warn!(
                        "🔄️💳️ Processor reports {amount} captured for {} but the local record expects {}",
                        event.reference, payment.amount
                    );
                }
                (transaction_id, payment_method)
            },
            ProcessorEventKind::Failed { reason } => {
                info!(
                    "🔄️💳️ Payment for {} failed: {}",
                    event.reference,
                    reason.as_deref().unwrap_or("no reason given")
                );
                (None, None)
            },
        };
        let result = self.db.settle_payment(payment.id, payment.status, target, transaction_id, payment_method).await;
        let (payment, order) = match result {
            Ok(pair) => pair,
            Err(LedgerError::TransitionConflict { .. }) => {
                // A concurrent delivery of the same event won the conditional update. The first writer already
                // applied it.
                debug!("🔄️💳️ Concurrent notification for {} settled first", event.reference);
                return Ok(SettlementOutcome::AlreadyApplied);
            },
            Err(e) => return Err(e.into()),
        };
        debug!(
            "🔄️💳️ Payment {} settled as {target}. Order {} payment status: {}",
            payment.payment_intent_id, order.order_number, order.payment_status
        );
        if target == SettlementStatus::Succeeded {
            self.call_order_paid_hook(&order, &payment).await;
        }
        Ok(SettlementOutcome::Applied)
    }

    /// Synchronous confirmation: re-queries the processor for the intent's current state and applies it.
    ///
    /// For clients that cannot wait for the asynchronous notification. Safe to race with notification delivery;
    /// whichever path applies first wins and the other is a no-op.
    pub async fn confirm_payment(&self, intent_id: &str) -> Result<SettlementOutcome, ReconciliationError> {
        let intent = self.processor.retrieve_intent(intent_id).await?;
        let Some(kind) = intent.outcome else {
            debug!("🔄️💳️ Intent {intent_id} is still pending processor-side");
            return Ok(SettlementOutcome::Stale);
        };
        let event = ProcessorEvent { reference: IntentRef::Intent(intent.intent_id), kind };
        self.apply_processor_event(event).await
    }

    /// Records a full or partial refund against a settled payment.
    ///
    /// Only a `succeeded` payment can be refunded, and the amount may not exceed the captured amount. The
    /// payment and the order's payment status move to `refunded` in one transaction.
    pub async fn refund_payment(&self, payment_id: i64, amount: Option<Cents>) -> Result<(Payment, Order), ReconciliationError> {
        let payment = self
            .db
            .fetch_payment(payment_id)
            .await?
            .ok_or_else(|| ReconciliationError::PaymentNotFound(payment_id.to_string()))?;
        if payment.status != SettlementStatus::Succeeded {
            return Err(ReconciliationError::InvalidState(format!(
                "Only a succeeded payment can be refunded; payment {payment_id} is {}",
                payment.status
            )));
        }
        let amount = amount.unwrap_or(payment.amount);
        if amount.is_negative() || amount > payment.amount {
            return Err(ReconciliationError::InvalidState(format!(
                "Refund amount {amount} is out of range for a {} payment",
                payment.amount
            )));
        }
        let (payment, order) = self.db.record_refund(payment_id, amount).await?;
        debug!("🔄️💳️ Refunded {amount} on payment {} for order {}", payment.payment_intent_id, order.order_number);
        Ok((payment, order))
    }

    /// Administrative cancellation of a payment record that will never settle.
    pub async fn cancel_payment(&self, payment_id: i64) -> Result<Payment, ReconciliationError> {
        let payment = self.db.cancel_payment(payment_id).await?;
        debug!("🔄️💳️ Payment {} marked cancelled", payment.payment_intent_id);
        Ok(payment)
    }

    pub async fn payment_for_order(&self, order_id: i64) -> Result<Option<Payment>, ReconciliationError> {
        let payment = self.db.current_payment_for_order(order_id).await?;
        Ok(payment)
    }

    async fn fetch_payment_for(&self, reference: &IntentRef) -> Result<Payment, ReconciliationError> {
        let payment = match reference {
            IntentRef::Intent(id) => self.db.fetch_payment_by_intent(id).await?,
            IntentRef::Session(id) => self.db.fetch_payment_by_session(id).await?,
        };
        payment.ok_or_else(|| ReconciliationError::PaymentNotFound(reference.to_string()))
    }

    async fn call_order_paid_hook(&self, order: &Order, payment: &Payment) {
        for emitter in &self.producers.order_paid_producer {
            trace!("🔄️💳️ Notifying order paid hook subscribers");
            let event = OrderPaidEvent::new(order.clone(), payment.clone());
            emitter.publish_event(event).await;
        }
    }
}
