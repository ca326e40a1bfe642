use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::*;
use marketplace_engine::traits::{
    IntentRef,
    NewIntentRequest,
    PaymentProcessor,
    ProcessorError,
    ProcessorEvent,
    ProcessorEventKind,
    ProcessorIntent,
};
use mp_common::Cents;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    config::StripeConfig,
    data_objects::{CheckoutSession, PaymentIntent, WebhookEnvelope},
    webhook::verify_signature,
    StripeApiError,
};

#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, StripeApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let mut val =
            HeaderValue::from_str(&bearer).map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert("Authorization", val);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StripeApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Sends a form-encoded request, as Stripe's API expects, and deserializes the JSON response.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, StripeApiError> {
        let url = format!("{}{path}", self.config.api_url);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !form.is_empty() {
            req = req.form(form);
        }
        let response = req.send().await.map_err(|e| StripeApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| StripeApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| StripeApiError::RestResponseError(e.to_string()))?;
            Err(StripeApiError::QueryError { status, message })
        }
    }

    pub async fn create_payment_intent(
        &self,
        amount: Cents,
        currency: &str,
        order_number: &str,
    ) -> Result<PaymentIntent, StripeApiError> {
        let form = [
            ("amount", amount.value().to_string()),
            ("currency", currency.to_string()),
            ("metadata[order_number]", order_number.to_string()),
        ];
        let intent = self.rest_query(Method::POST, "/payment_intents", &form).await?;
        debug!("💳️ Created payment intent for order {order_number} ({amount})");
        Ok(intent)
    }

    pub async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, StripeApiError> {
        let path = format!("/payment_intents/{intent_id}");
        self.rest_query(Method::GET, &path, &[]).await
    }

    pub async fn create_checkout_session(&self, intent_id: &str) -> Result<CheckoutSession, StripeApiError> {
        let form = [("mode", "payment".to_string()), ("payment_intent", intent_id.to_string())];
        let session = self.rest_query(Method::POST, "/checkout/sessions", &form).await?;
        debug!("💳️ Created checkout session for intent {intent_id}");
        Ok(session)
    }
}

/// Maps an intent's processor-side status to a settlement outcome. `None` means the intent has not reached a
/// reportable outcome yet.
fn intent_outcome(intent: &PaymentIntent) -> Option<ProcessorEventKind> {
    match intent.status.as_str() {
        "succeeded" => {
            let (transaction_id, payment_method) = charge_details(intent);
            Some(ProcessorEventKind::Succeeded { transaction_id, payment_method, amount: Cents::from(intent.amount) })
        },
        "canceled" => {
            let reason = intent.last_payment_error.as_ref().and_then(|e| e.code.clone());
            Some(ProcessorEventKind::Failed { reason })
        },
        _ => None,
    }
}

fn charge_details(intent: &PaymentIntent) -> (Option<String>, Option<String>) {
    let Some(charge) = &intent.latest_charge else {
        return (None, None);
    };
    let method = charge.payment_method_details.as_ref().map(|d| d.method_type.clone());
    (Some(charge.id.clone()), method)
}

impl PaymentProcessor for StripeApi {
    async fn create_intent(&self, request: NewIntentRequest) -> Result<ProcessorIntent, ProcessorError> {
        let intent = self
            .create_payment_intent(request.amount, &request.currency, request.order_number.as_str())
            .await
            .map_err(|e| ProcessorError::Upstream(e.to_string()))?;
        let session_id = if self.config.use_checkout_sessions {
            let session =
                self.create_checkout_session(&intent.id).await.map_err(|e| ProcessorError::Upstream(e.to_string()))?;
            Some(session.id)
        } else {
            None
        };
        Ok(ProcessorIntent {
            outcome: intent_outcome(&intent),
            intent_id: intent.id,
            session_id,
            amount: Cents::from(intent.amount),
            currency: intent.currency,
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError> {
        let intent =
            self.retrieve_payment_intent(intent_id).await.map_err(|e| ProcessorError::Upstream(e.to_string()))?;
        Ok(ProcessorIntent {
            outcome: intent_outcome(&intent),
            intent_id: intent.id,
            session_id: None,
            amount: Cents::from(intent.amount),
            currency: intent.currency,
        })
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<ProcessorEvent, ProcessorError> {
        verify_signature(
            self.config.webhook_secret.reveal(),
            signature,
            payload,
            Utc::now().timestamp(),
            self.config.signature_tolerance_secs,
        )
        .map_err(|e| ProcessorError::InvalidSignature(e.to_string()))?;
        let envelope: WebhookEnvelope =
            serde_json::from_slice(payload).map_err(|e| ProcessorError::MalformedEvent(e.to_string()))?;
        parse_event(&envelope).map_err(|e| ProcessorError::MalformedEvent(e.to_string()))
    }
}

fn parse_event(envelope: &WebhookEnvelope) -> Result<ProcessorEvent, StripeApiError> {
    let object = &envelope.data.object;
    match envelope.event_type.as_str() {
        "payment_intent.succeeded" | "payment_intent.payment_failed" => {
            let intent: PaymentIntent = serde_json::from_value(object.clone())
                .map_err(|e| StripeApiError::JsonError(e.to_string()))?;
            let kind = if envelope.event_type == "payment_intent.succeeded" {
                let (transaction_id, payment_method) = charge_details(&intent);
                ProcessorEventKind::Succeeded { transaction_id, payment_method, amount: Cents::from(intent.amount) }
            } else {
                let reason = intent.last_payment_error.as_ref().and_then(|e| e.code.clone());
                ProcessorEventKind::Failed { reason }
            };
            Ok(ProcessorEvent { reference: IntentRef::Intent(intent.id), kind })
        },
        "checkout.session.completed" => {
            let session: CheckoutSession = serde_json::from_value(object.clone())
                .map_err(|e| StripeApiError::JsonError(e.to_string()))?;
            let amount = amount_total(object);
            Ok(ProcessorEvent {
                reference: IntentRef::Session(session.id),
                kind: ProcessorEventKind::Succeeded { transaction_id: session.payment_intent, payment_method: None, amount },
            })
        },
        other => Err(StripeApiError::UnknownEvent(other.to_string())),
    }
}

fn amount_total(object: &Value) -> Cents {
    Cents::from(object.get("amount_total").and_then(Value::as_i64).unwrap_or_default())
}
