mod support;

use marketplace_engine::{
    db_types::{NewPayment, OrderStatus, PaymentStatus, SettlementStatus},
    test_utils::MockProcessor,
    traits::{IntentRef, ProcessorEventKind},
    MarketplaceDatabase,
    ReconciliationError,
    SettlementOutcome,
};
use mp_common::Cents;
use support::{new_test_db, order_api, reconciliation_api, sample_order};

fn succeeded(amount: Cents) -> ProcessorEventKind {
    ProcessorEventKind::Succeeded {
        transaction_id: Some("txn_12345".to_string()),
        payment_method: Some("card".to_string()),
        amount,
    }
}

#[tokio::test]
async fn successful_settlement_confirms_the_order() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());

    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.expect("Error creating intent");
    assert_eq!(payment.status, SettlementStatus::Pending);
    assert_eq!(payment.amount, order.total_amount);

    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(payment.payment_intent_id.clone()), succeeded(payment.amount));
    let outcome = api.apply_notification(&payload, &signature).await.expect("Error applying notification");
    assert_eq!(outcome, SettlementOutcome::Applied);

    let payment = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(payment.status, SettlementStatus::Succeeded);
    assert_eq!(payment.transaction_id.as_deref(), Some("txn_12345"));

    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.status, OrderStatus::Confirmed, "A paid pending order auto-advances to confirmed");
    let events = db.tracking_for_order(order.id).await.unwrap();
    assert_eq!(events.last().unwrap().status, OrderStatus::Confirmed);
}

#[tokio::test]
async fn duplicate_notifications_are_idempotent() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());

    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();
    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(payment.payment_intent_id.clone()), succeeded(payment.amount));

    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Applied);
    let events_after_first = db.tracking_for_order(order.id).await.unwrap().len();

    // The processor redelivers. Nothing may change.
    for _ in 0..3 {
        assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::AlreadyApplied);
    }
    let payment = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(payment.status, SettlementStatus::Succeeded);
    assert_eq!(db.tracking_for_order(order.id).await.unwrap().len(), events_after_first);
}

#[tokio::test]
async fn stale_notifications_are_ignored() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());

    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();
    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(payment.payment_intent_id.clone()), succeeded(payment.amount));
    api.apply_notification(&payload, &signature).await.unwrap();
    api.refund_payment(payment.id, None).await.unwrap();

    // A delayed "succeeded" delivery arrives after the refund. It must not resurrect the payment.
    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Stale);
    let payment = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(payment.status, SettlementStatus::Refunded);

    // A "failed" delivery after settlement is equally stale.
    let (payload, signature) = MockProcessor::notification(
        IntentRef::Intent(payment.payment_intent_id.clone()),
        ProcessorEventKind::Failed { reason: Some("card_declined".to_string()) },
    );
    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Stale);
}

#[tokio::test]
async fn failed_settlement_marks_the_order_unpaid() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());

    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();
    let (payload, signature) = MockProcessor::notification(
        IntentRef::Intent(payment.payment_intent_id.clone()),
        ProcessorEventKind::Failed { reason: Some("insufficient_funds".to_string()) },
    );
    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Applied);

    let payment = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(payment.status, SettlementStatus::Failed);
    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.status, OrderStatus::Pending, "A failed payment never advances the order");
}

#[tokio::test]
async fn unverifiable_and_unknown_notifications_are_rejected() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());
    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();

    // Bad signature: rejected before the payload is even parsed.
    let (payload, _) =
        MockProcessor::notification(IntentRef::Intent(payment.payment_intent_id.clone()), succeeded(payment.amount));
    let err = api.apply_notification(&payload, "forged").await.unwrap_err();
    assert!(matches!(err, ReconciliationError::Authentication(_)));

    // Unknown intent reference: the processor must keep retrying, so this is an error, not a no-op.
    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent("pi_unknown".to_string()), succeeded(payment.amount));
    let err = api.apply_notification(&payload, &signature).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::PaymentNotFound(_)));

    let unchanged = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, SettlementStatus::Pending);
}

#[tokio::test]
async fn session_references_resolve_too() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());
    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();
    let session_id = payment.session_id.clone().expect("Mock always mints a session");

    let (payload, signature) = MockProcessor::notification(IntentRef::Session(session_id), succeeded(payment.amount));
    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Applied);
    let payment = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(payment.status, SettlementStatus::Succeeded);
}

#[tokio::test]
async fn synchronous_confirmation_path() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let processor = MockProcessor::new();
    let api = reconciliation_api(db.clone(), processor.clone());
    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();

    // Still pending processor-side: nothing to apply.
    assert_eq!(api.confirm_payment(&payment.payment_intent_id).await.unwrap(), SettlementOutcome::Stale);

    processor.set_outcome(&payment.payment_intent_id, succeeded(payment.amount));
    assert_eq!(api.confirm_payment(&payment.payment_intent_id).await.unwrap(), SettlementOutcome::Applied);
    // Racing the asynchronous path is safe: the second application is a duplicate.
    assert_eq!(api.confirm_payment(&payment.payment_intent_id).await.unwrap(), SettlementOutcome::AlreadyApplied);

    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn refund_rules() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());
    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();

    // A pending payment cannot be refunded.
    let err = api.refund_payment(payment.id, None).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::InvalidState(_)));

    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(payment.payment_intent_id.clone()), succeeded(payment.amount));
    api.apply_notification(&payload, &signature).await.unwrap();

    // Refunding more than was captured is rejected.
    let err = api.refund_payment(payment.id, Some(payment.amount + Cents::from(1))).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::InvalidState(_)));

    // A partial refund records the amount and flips both statuses.
    let (refunded, order) = api.refund_payment(payment.id, Some(Cents::from_major(100))).await.unwrap();
    assert_eq!(refunded.status, SettlementStatus::Refunded);
    assert_eq!(refunded.refund_amount, Some(Cents::from_major(100)));
    assert_eq!(order.payment_status, PaymentStatus::Refunded);

    // And a second refund attempt finds the payment no longer succeeded.
    let err = api.refund_payment(payment.id, None).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::InvalidState(_)));
}

#[tokio::test]
async fn cancelled_payments_stay_cancelled() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());
    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();

    let cancelled = api.cancel_payment(payment.id).await.unwrap();
    assert_eq!(cancelled.status, SettlementStatus::Cancelled);
    // Re-fetch to make sure the cancellation was actually written, not just echoed back.
    let stored = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SettlementStatus::Cancelled);

    // Cancellation is terminal: a late "succeeded" delivery for the intent is stale, not applied.
    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(payment.payment_intent_id.clone()), succeeded(payment.amount));
    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Stale);
    let stored = db.fetch_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SettlementStatus::Cancelled);
    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn late_settlement_on_a_superseded_intent_leaves_the_refund_intact() {
    let db = new_test_db().await;
    let orders = order_api(db.clone());
    let api = reconciliation_api(db.clone(), MockProcessor::new());
    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;

    // A first checkout attempt stalls, so a retry mints a second intent for the same order.
    let stalled = api.create_payment_intent(order.id).await.unwrap();
    let retry = db.insert_payment(NewPayment::new(order.id, "pi_retry_1", order.total_amount, "usd")).await.unwrap();

    // The retry settles and is then refunded.
    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(retry.payment_intent_id.clone()), succeeded(retry.amount));
    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Applied);
    api.refund_payment(retry.id, None).await.unwrap();

    // The stalled intent finally succeeds. Its own record settles, but the order stays refunded.
    let events_before = db.tracking_for_order(order.id).await.unwrap().len();
    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(stalled.payment_intent_id.clone()), succeeded(stalled.amount));
    assert_eq!(api.apply_notification(&payload, &signature).await.unwrap(), SettlementOutcome::Applied);

    let stalled = db.fetch_payment(stalled.id).await.unwrap().unwrap();
    assert_eq!(stalled.status, SettlementStatus::Succeeded);
    let order = db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Refunded, "A late settlement must not undo a refund");
    assert_eq!(db.tracking_for_order(order.id).await.unwrap().len(), events_before);
}

#[tokio::test]
async fn intent_creation_requires_an_unpaid_order() {
    let db = new_test_db().await;
    let api = reconciliation_api(db.clone(), MockProcessor::new());
    let err = api.create_payment_intent(99_999).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::OrderNotFound(99_999)));

    let orders = order_api(db.clone());
    let order = orders.create_order(sample_order(1, 7)).await.unwrap().order;
    let payment = api.create_payment_intent(order.id).await.unwrap();
    let (payload, signature) =
        MockProcessor::notification(IntentRef::Intent(payment.payment_intent_id.clone()), succeeded(payment.amount));
    api.apply_notification(&payload, &signature).await.unwrap();

    // A second intent against a paid order is refused.
    let err = api.create_payment_intent(order.id).await.unwrap_err();
    assert!(matches!(err, ReconciliationError::InvalidState(_)));
}
