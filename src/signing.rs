//! Canonical serialization and keyed integrity tags for requests
//!
//! Sender and receiver must agree byte-for-byte on the canonical form:
//! a JSON object with lexicographically sorted keys and compact separators,
//! covering every wire field except the signature itself. The tag is
//! HMAC-SHA256 over those bytes, hex-encoded.

use crate::request::{Envelope, RequestIntent, WireRequest};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Shared signing secret
///
/// Read-only, process-wide configuration; passed explicitly into the
/// components that need it, never held in mutable global state.
#[derive(Clone)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Wrap raw key bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Key material
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for SecretKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "SecretKey(<redacted>)")
    }
}

/// Signs and verifies requests with a shared secret
#[derive(Debug, Clone)]
pub struct Signer {
    key: SecretKey,
}

impl Signer {
    /// Create a signer over the shared secret
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }

    /// Canonical signable bytes: sorted keys, compact separators, no
    /// signature field
    fn canonical_bytes(intent: &RequestIntent, envelope: &Envelope) -> Vec<u8> {
        // serde_json's default object map is ordered, so key order here is
        // irrelevant; the output is always lexicographically sorted.
        let value = json!({
            "request_id": intent.request_id.as_str(),
            "operation": intent.operation.wire_name(),
            "book_code": intent.book_code,
            "user_id": intent.user_id,
            "timestamp": envelope.timestamp,
            "nonce": envelope.nonce,
        });
        serde_json::to_vec(&value).expect("canonical JSON of plain fields cannot fail")
    }

    fn mac(&self, bytes: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(bytes);
        mac
    }

    /// Compute the hex integrity tag for one attempt
    ///
    /// Pure and deterministic for fixed inputs: any difference in a field
    /// value changes the tag.
    pub fn signature(&self, intent: &RequestIntent, envelope: &Envelope) -> String {
        let bytes = Self::canonical_bytes(intent, envelope);
        hex::encode(self.mac(&bytes).finalize().into_bytes())
    }

    /// Seal an intent with a per-attempt envelope into a wire request
    pub fn seal(&self, intent: &RequestIntent, envelope: &Envelope) -> WireRequest {
        WireRequest {
            request_id: intent.request_id.clone(),
            operation: intent.operation,
            book_code: intent.book_code.clone(),
            user_id: intent.user_id,
            timestamp: envelope.timestamp,
            nonce: envelope.nonce.clone(),
            signature: self.signature(intent, envelope),
        }
    }

    /// Verify a wire request's integrity tag (constant-time comparison)
    ///
    /// This is the receiver's half of the codec; it lives here so both ends
    /// share one canonicalization.
    pub fn verify(&self, wire: &WireRequest) -> bool {
        let intent = RequestIntent {
            request_id: wire.request_id.clone(),
            operation: wire.operation,
            book_code: wire.book_code.clone(),
            user_id: wire.user_id,
        };
        let envelope = Envelope::from_parts(wire.timestamp, wire.nonce.clone());
        let bytes = Self::canonical_bytes(&intent, &envelope);

        let Ok(tag) = hex::decode(&wire.signature) else {
            return false;
        };
        self.mac(&bytes).verify_slice(&tag).is_ok()
    }

    /// Verify integrity and freshness against a replay-acceptance window
    ///
    /// The timestamp may be at most `window_secs` away from `now` in either
    /// direction; a refreshed envelope keeps a retried attempt inside the
    /// window no matter how much backoff has accumulated.
    pub fn verify_fresh(&self, wire: &WireRequest, window_secs: i64, now: i64) -> bool {
        (now - wire.timestamp).abs() <= window_secs && self.verify(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Operation, RequestId};

    fn sample_intent() -> RequestIntent {
        RequestIntent {
            request_id: RequestId::from("0123456789abcdef0123456789abcdef"),
            operation: Operation::Renew,
            book_code: "BOOK-472".to_string(),
            user_id: 31,
        }
    }

    fn signer() -> Signer {
        Signer::new(SecretKey::from("demo-key"))
    }

    #[test]
    fn test_sign_is_deterministic() {
        let intent = sample_intent();
        let envelope = Envelope::from_parts(1_700_000_000, "aabbccddeeff0011");
        let s = signer();
        assert_eq!(
            s.signature(&intent, &envelope),
            s.signature(&intent, &envelope)
        );
    }

    #[test]
    fn test_sign_then_verify() {
        let intent = sample_intent();
        let envelope = Envelope::from_parts(1_700_000_000, "aabbccddeeff0011");
        let s = signer();
        let wire = s.seal(&intent, &envelope);
        assert!(s.verify(&wire));
    }

    #[test]
    fn test_any_field_change_invalidates_tag() {
        let intent = sample_intent();
        let envelope = Envelope::from_parts(1_700_000_000, "aabbccddeeff0011");
        let s = signer();
        let sealed = s.seal(&intent, &envelope);

        let mut tampered = sealed.clone();
        tampered.user_id += 1;
        assert!(!s.verify(&tampered));

        let mut tampered = sealed.clone();
        tampered.book_code = "BOOK-473".to_string();
        assert!(!s.verify(&tampered));

        let mut tampered = sealed.clone();
        tampered.timestamp += 1;
        assert!(!s.verify(&tampered));

        let mut tampered = sealed.clone();
        tampered.nonce = "ffffffffffffffff".to_string();
        assert!(!s.verify(&tampered));

        let mut tampered = sealed.clone();
        tampered.operation = Operation::Return;
        assert!(!s.verify(&tampered));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let intent = sample_intent();
        let envelope = Envelope::from_parts(1_700_000_000, "aabbccddeeff0011");
        let wire = signer().seal(&intent, &envelope);
        let other = Signer::new(SecretKey::from("other-key"));
        assert!(!other.verify(&wire));
    }

    #[test]
    fn test_garbage_signature_fails_cleanly() {
        let intent = sample_intent();
        let envelope = Envelope::from_parts(1_700_000_000, "aabbccddeeff0011");
        let mut wire = signer().seal(&intent, &envelope);
        wire.signature = "not-hex".to_string();
        assert!(!signer().verify(&wire));
    }

    #[test]
    fn test_replay_window() {
        let intent = sample_intent();
        let now = 1_700_000_000;
        let envelope = Envelope::from_parts(now - 30, "aabbccddeeff0011");
        let s = signer();
        let wire = s.seal(&intent, &envelope);

        assert!(s.verify_fresh(&wire, 60, now));
        assert!(!s.verify_fresh(&wire, 10, now));

        // A future-dated timestamp outside the window is rejected too
        let envelope = Envelope::from_parts(now + 120, "aabbccddeeff0011");
        let wire = s.seal(&intent, &envelope);
        assert!(!s.verify_fresh(&wire, 60, now));
    }

    #[test]
    fn test_canonical_form_is_sorted_and_compact() {
        let intent = sample_intent();
        let envelope = Envelope::from_parts(1_700_000_000, "aabbccddeeff0011");
        let bytes = Signer::canonical_bytes(&intent, &envelope);
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "{\"book_code\":\"BOOK-472\",\"nonce\":\"aabbccddeeff0011\",\
             \"operation\":\"renew\",\"request_id\":\"0123456789abcdef0123456789abcdef\",\
             \"timestamp\":1700000000,\"user_id\":31}"
        );
    }

    #[test]
    fn test_secret_key_debug_redacts() {
        let key = SecretKey::from("super-secret");
        assert_eq!(format!("{:?}", key), "SecretKey(<redacted>)");
    }
}
