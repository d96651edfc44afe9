//! Reply types returned by the receiving authority

use crate::request::RequestId;
use serde::{Deserialize, Serialize};

/// Reply status as reported by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    /// Request accepted
    #[serde(rename = "OK")]
    Ok,
    /// Request rejected; authoritative, never retried
    #[serde(rename = "ERROR")]
    Error,
}

impl ReplyStatus {
    /// Check if this status indicates acceptance
    pub fn is_ok(&self) -> bool {
        matches!(self, ReplyStatus::Ok)
    }
}

/// Reply message as it travels on the wire
///
/// Carries at minimum the status and an echo of the request id; the echo is
/// what lets a session detect a desynchronized channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireReply {
    /// Accepted or rejected
    pub status: ReplyStatus,

    /// Echo of the request this reply answers
    pub request_id: RequestId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_status_wire_format() {
        assert_eq!(serde_json::to_string(&ReplyStatus::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&ReplyStatus::Error).unwrap(),
            "\"ERROR\""
        );
    }

    #[test]
    fn test_reply_roundtrip() {
        let reply = WireReply {
            status: ReplyStatus::Ok,
            request_id: RequestId::from("deadbeef"),
        };
        let json = serde_json::to_string(&reply).unwrap();
        let back: WireReply = serde_json::from_str(&json).unwrap();
        assert!(back.status.is_ok());
        assert_eq!(back.request_id, reply.request_id);
    }
}
