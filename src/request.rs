//! Request types: the immutable intent and the per-attempt envelope

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operation kinds understood by the receiving authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Renew an existing loan
    Renew,
    /// Return a borrowed book
    Return,
    /// Take out a new loan
    Loan,
}

impl Operation {
    /// Lowercase name used on the wire and in canonical signing form
    pub fn wire_name(&self) -> &'static str {
        match self {
            Operation::Renew => "renew",
            Operation::Return => "return",
            Operation::Loan => "loan",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Uppercase in log lines, lowercase on the wire
        match self {
            Operation::Renew => write!(f, "RENEW"),
            Operation::Return => write!(f, "RETURN"),
            Operation::Loan => write!(f, "LOAN"),
        }
    }
}

impl FromStr for Operation {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "renew" => Ok(Operation::Renew),
            "return" => Ok(Operation::Return),
            "loan" => Ok(Operation::Loan),
            other => Err(crate::error::Error::Config(format!(
                "unknown operation: {other}"
            ))),
        }
    }
}

/// Unique request identifier, stable across every retry of one logical request
///
/// This is the only field the receiver can use to deduplicate resends of the
/// same request, since the envelope fields change on every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an identifier token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestId {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// The immutable half of a request
///
/// Fixed at batch-generation time and never mutated; the per-attempt fields
/// (timestamp, nonce, signature) live in [`Envelope`] and [`WireRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIntent {
    /// Unique identifier, stable for the life of the request
    pub request_id: RequestId,

    /// Operation kind
    pub operation: Operation,

    /// Book identifier, e.g. "BOOK-472"
    pub book_code: String,

    /// Requesting user
    pub user_id: u32,
}

/// The per-attempt half of a request
///
/// Regenerated immediately before every transmission attempt (initial send
/// and every retry) so each attempt lands inside the receiver's
/// replay-acceptance window, then discarded.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Seconds since epoch at the moment of this attempt
    pub timestamp: i64,

    /// Fresh random token; distinguishes resends from replays
    pub nonce: String,
}

impl Envelope {
    /// Stamp a fresh envelope for one transmission attempt
    pub fn fresh() -> Self {
        let bytes: [u8; 8] = rand::thread_rng().gen();
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            nonce: hex::encode(bytes),
        }
    }

    /// Build an envelope from explicit parts (deterministic, for verification
    /// and tests)
    pub fn from_parts(timestamp: i64, nonce: impl Into<String>) -> Self {
        Self {
            timestamp,
            nonce: nonce.into(),
        }
    }
}

/// A fully sealed request as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Stable identifier echoed back by the receiver
    pub request_id: RequestId,

    /// Operation kind (lowercase on the wire)
    pub operation: Operation,

    /// Book identifier
    pub book_code: String,

    /// Requesting user
    pub user_id: u32,

    /// Attempt timestamp, seconds since epoch
    pub timestamp: i64,

    /// Attempt nonce
    pub nonce: String,

    /// Hex-encoded HMAC-SHA256 over every other field
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(Operation::Renew.wire_name(), "renew");
        assert_eq!(Operation::Return.wire_name(), "return");
        assert_eq!(Operation::Loan.wire_name(), "loan");
    }

    #[test]
    fn test_operation_display_uppercase() {
        assert_eq!(Operation::Renew.to_string(), "RENEW");
        assert_eq!(Operation::Return.to_string(), "RETURN");
        assert_eq!(Operation::Loan.to_string(), "LOAN");
    }

    #[test]
    fn test_operation_from_str_case_insensitive() {
        assert_eq!("RENEW".parse::<Operation>().unwrap(), Operation::Renew);
        assert_eq!("return".parse::<Operation>().unwrap(), Operation::Return);
        assert!("checkout".parse::<Operation>().is_err());
    }

    #[test]
    fn test_operation_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Operation::Renew).unwrap(),
            "\"renew\""
        );
        let op: Operation = serde_json::from_str("\"return\"").unwrap();
        assert_eq!(op, Operation::Return);
    }

    #[test]
    fn test_request_id_transparent_serde() {
        let id = RequestId::from("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
    }

    #[test]
    fn test_envelope_fresh_nonce_length() {
        let env = Envelope::fresh();
        assert_eq!(env.nonce.len(), 16);
        assert!(env.timestamp > 0);
    }

    #[test]
    fn test_envelope_fresh_nonces_differ() {
        let a = Envelope::fresh();
        let b = Envelope::fresh();
        assert_ne!(a.nonce, b.nonce);
    }
}
