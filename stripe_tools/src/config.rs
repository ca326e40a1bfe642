use log::*;
use mp_common::{helpers::parse_boolean_flag, Secret};

pub const DEFAULT_API_URL: &str = "https://api.stripe.com/v1";
/// Notifications older than this are rejected even when correctly signed.
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Default)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    /// Whether to mint a hosted checkout session alongside each payment intent.
    pub use_checkout_sessions: bool,
    /// Outbound call timeout in seconds. A timed-out call is an error, never an ambiguous pending state.
    pub timeout_secs: u64,
    pub signature_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("MPE_STRIPE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let secret_key = Secret::new(std::env::var("MPE_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("MPE_STRIPE_SECRET_KEY not set, using (probably useless) default");
            "sk_test_00000000000000".to_string()
        }));
        let webhook_secret = Secret::new(std::env::var("MPE_STRIPE_WEBHOOK_SECRET").unwrap_or_else(|_| {
            warn!("MPE_STRIPE_WEBHOOK_SECRET not set, using (probably useless) default");
            "whsec_00000000000000".to_string()
        }));
        let use_checkout_sessions = parse_boolean_flag(std::env::var("MPE_STRIPE_CHECKOUT_SESSIONS").ok(), true);
        let timeout_secs = std::env::var("MPE_STRIPE_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30);
        Self {
            api_url,
            secret_key,
            webhook_secret,
            use_checkout_sessions,
            timeout_secs,
            signature_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
        }
    }
}
