//! Stripe webhook signature verification.
//!
//! Stripe signs each delivery with an HMAC-SHA256 over `"{timestamp}.{payload}"` and sends the result in the
//! `Stripe-Signature` header as `t=<timestamp>,v1=<hex>[,v1=<hex>...]`. Verification recomputes the MAC over
//! the exact raw payload bytes and accepts the delivery if any `v1` value matches and the timestamp is within
//! the configured tolerance.
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::StripeApiError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, StripeApiError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(StripeApiError::SignatureError(format!("Malformed signature element: {part}")));
            };
            match key {
                "t" => {
                    let ts = value
                        .parse::<i64>()
                        .map_err(|e| StripeApiError::SignatureError(format!("Invalid timestamp: {e}")))?;
                    timestamp = Some(ts);
                },
                "v1" => signatures.push(value.to_string()),
                // Other schemes (v0) are ignored.
                _ => {},
            }
        }
        let timestamp =
            timestamp.ok_or_else(|| StripeApiError::SignatureError("No timestamp in signature header".to_string()))?;
        if signatures.is_empty() {
            return Err(StripeApiError::SignatureError("No v1 signature in header".to_string()));
        }
        Ok(Self { timestamp, signatures })
    }
}

/// Computes the hex-encoded `v1` signature for a payload.
pub fn calculate_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take a key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature header against the raw payload bytes.
///
/// `now` is the current unix timestamp, passed in so both clock sources and tests stay deterministic. The MAC
/// comparison is constant-time.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), StripeApiError> {
    let header = SignatureHeader::parse(header)?;
    if (now - header.timestamp).abs() > tolerance_secs {
        return Err(StripeApiError::SignatureError(format!(
            "Signature timestamp {} is outside the {tolerance_secs}s tolerance",
            header.timestamp
        )));
    }
    let verified = header.signatures.iter().any(|sig| {
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });
    if verified {
        Ok(())
    } else {
        Err(StripeApiError::SignatureError("No v1 signature matched the payload".to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::{calculate_signature, verify_signature, SignatureHeader};

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;

    #[test]
    fn parse_header() {
        let header = SignatureHeader::parse("t=1700000000,v1=abc123,v0=ignored,v1=def456").unwrap();
        assert_eq!(header.timestamp, 1_700_000_000);
        assert_eq!(header.signatures, vec!["abc123", "def456"]);
        assert!(SignatureHeader::parse("v1=abc").is_err());
        assert!(SignatureHeader::parse("t=1700000000").is_err());
        assert!(SignatureHeader::parse("garbage").is_err());
    }

    #[test]
    fn round_trip_verification() {
        let ts = 1_700_000_000;
        let sig = calculate_signature(SECRET, ts, PAYLOAD);
        let header = format!("t={ts},v1={sig}");
        assert!(verify_signature(SECRET, &header, PAYLOAD, ts + 10, 300).is_ok());
    }

    #[test]
    fn rejects_tampered_payload_and_wrong_secret() {
        let ts = 1_700_000_000;
        let sig = calculate_signature(SECRET, ts, PAYLOAD);
        let header = format!("t={ts},v1={sig}");
        assert!(verify_signature(SECRET, &header, b"tampered", ts, 300).is_err());
        assert!(verify_signature("whsec_other", &header, PAYLOAD, ts, 300).is_err());
    }

    #[test]
    fn rejects_stale_timestamps() {
        let ts = 1_700_000_000;
        let sig = calculate_signature(SECRET, ts, PAYLOAD);
        let header = format!("t={ts},v1={sig}");
        assert!(verify_signature(SECRET, &header, PAYLOAD, ts + 301, 300).is_err());
        // Future-dated deliveries are just as suspect.
        assert!(verify_signature(SECRET, &header, PAYLOAD, ts - 301, 300).is_err());
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        // During secret rotation Stripe sends one v1 per live secret.
        let ts = 1_700_000_000;
        let good = calculate_signature(SECRET, ts, PAYLOAD);
        let header = format!("t={ts},v1=deadbeef,v1={good}");
        assert!(verify_signature(SECRET, &header, PAYLOAD, ts, 300).is_ok());
    }
}
