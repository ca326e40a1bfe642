//! Wire shapes for the subset of the Stripe API the marketplace uses.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    /// One of `requires_payment_method`, `processing`, `succeeded`, `canceled`, ...
    pub status: String,
    #[serde(default)]
    pub latest_charge: Option<ChargeSummary>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeSummary {
    pub id: String,
    #[serde(default)]
    pub payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(rename = "type")]
    pub method_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// The outer envelope of a webhook delivery. `data.object` is type-dependent and kept raw until the event type
/// has been matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    pub object: Value,
}
