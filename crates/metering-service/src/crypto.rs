//! Cryptographic utilities for webhook verification.
//!
//! Shared primitives for verifying inbound webhook signatures from the
//! billing processor and the identity provider.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the hex-encoded result (64 characters).
///
/// # Panics
///
/// Never panics in practice: HMAC-SHA256 accepts keys of any size per
/// RFC 2104, so `new_from_slice` only fails if the Hmac implementation is
/// broken.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Verify a timestamped `t=<ts>,v1=<sig>` signature header.
///
/// The signed payload is `{timestamp}.{body}`; any of the `v1` entries may
/// match (the processor sends several during secret rotation).
///
/// Returns `false` for malformed headers as well as bad signatures.
#[must_use]
pub fn verify_timestamped_signature(secret: &str, payload: &str, header: &str) -> bool {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(ts)) => timestamp = Some(ts),
            (Some("v1"), Some(sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    if signatures.is_empty() {
        return false;
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
    signatures.iter().any(|sig| constant_time_eq(&expected, sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_produces_correct_length() {
        let result = hmac_sha256_hex("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(result.len(), 64);
    }

    #[test]
    fn hmac_sha256_is_deterministic() {
        assert_eq!(
            hmac_sha256_hex("secret", "message"),
            hmac_sha256_hex("secret", "message")
        );
        assert_ne!(
            hmac_sha256_hex("secret", "message1"),
            hmac_sha256_hex("secret", "message2")
        );
    }

    #[test]
    fn constant_time_eq_cases() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }

    #[test]
    fn timestamped_signature_roundtrip() {
        let payload = r#"{"id":"evt_1"}"#;
        let sig = hmac_sha256_hex("whsec", &format!("123.{payload}"));
        let header = format!("t=123,v1={sig}");

        assert!(verify_timestamped_signature("whsec", payload, &header));
        assert!(!verify_timestamped_signature("wrong", payload, &header));
        assert!(!verify_timestamped_signature("whsec", "tampered", &header));
    }

    #[test]
    fn timestamped_signature_rejects_malformed_headers() {
        assert!(!verify_timestamped_signature("whsec", "body", ""));
        assert!(!verify_timestamped_signature("whsec", "body", "t=123"));
        assert!(!verify_timestamped_signature("whsec", "body", "v1=deadbeef"));
    }

    #[test]
    fn timestamped_signature_accepts_any_v1_entry() {
        let payload = "body";
        let sig = hmac_sha256_hex("whsec", &format!("9.{payload}"));
        let header = format!("t=9,v1=badbadbadbad,v1={sig}");

        assert!(verify_timestamped_signature("whsec", payload, &header));
    }
}
