//! A thin Stripe client for the marketplace engine.
//!
//! Provides payment intent and checkout session management over Stripe's REST API, plus webhook signature
//! verification. [`StripeApi`] implements the engine's `PaymentProcessor` trait, so the engine itself stays
//! provider-agnostic.
mod api;
mod config;
mod error;
mod webhook;

mod data_objects;

pub use api::StripeApi;
pub use config::StripeConfig;
pub use data_objects::{ChargeSummary, CheckoutSession, PaymentIntent, WebhookEnvelope};
pub use error::StripeApiError;
pub use webhook::{calculate_signature, verify_signature, SignatureHeader};
