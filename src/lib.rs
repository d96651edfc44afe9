//! loanbench: the requester half of a request/reply load-testing harness
//!
//! This crate manufactures signed, replay-protected loan requests,
//! dispatches them over strict lock-step request/reply channels with
//! bounded retry/backoff, and turns the per-request outcome log into
//! latency and throughput statistics. It provides:
//!
//! - Request signing and canonical serialization (HMAC-SHA256)
//! - Deterministic batch generation from a seed and operation mix
//! - The lock-step dispatch session with per-attempt timeout and backoff
//! - A multi-session orchestrator with a consolidated, time-ordered log
//! - Outcome-log aggregation (counts, latency percentiles, throughput)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod channel;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod outcome;
pub mod request;
pub mod response;
pub mod session;
pub mod signing;
pub mod transport;

pub use batch::{Batch, OperationMix};
pub use channel::{Channel, ChannelError, LockStepLink, Transport};
pub use config::{HarnessConfig, RetryPlan};
pub use error::{Error, Result};
pub use metrics::{summarize, summarize_by_operation, MetricsSummary, SummaryFilter};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunMode, RunReport};
pub use outcome::{Outcome, OutcomeStatus};
pub use request::{Envelope, Operation, RequestId, RequestIntent, WireRequest};
pub use response::{ReplyStatus, WireReply};
pub use session::{DispatchSession, SessionStats};
pub use signing::{SecretKey, Signer};
pub use transport::TcpTransport;

#[cfg(test)]
mod integration_tests {
    use super::*;

    // =========================================================================
    // Wire-format round trips
    // =========================================================================

    #[test]
    fn test_wire_request_roundtrip() {
        let signer = Signer::new(SecretKey::from("demo-key"));
        let intent = RequestIntent {
            request_id: RequestId::from("00ff00ff00ff00ff"),
            operation: Operation::Loan,
            book_code: "BOOK-9".to_string(),
            user_id: 3,
        };
        let envelope = request::Envelope::from_parts(1_700_000_000, "0011223344556677");
        let wire = signer.seal(&intent, &envelope);

        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("\"operation\":\"loan\""));

        let back: WireRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wire);
        assert!(signer.verify(&back));
    }

    #[test]
    fn test_reply_echo_contract() {
        let json = "{\"status\":\"OK\",\"request_id\":\"abc\"}";
        let reply: WireReply = serde_json::from_str(json).unwrap();
        assert!(reply.status.is_ok());
        assert_eq!(reply.request_id, RequestId::from("abc"));
    }

    // =========================================================================
    // Batch-to-log flow on disk
    // =========================================================================

    #[test]
    fn test_outcome_log_survives_concatenation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.log");

        let make = |id: &str, start: f64| Outcome {
            request_id: RequestId::from(id),
            operation: Operation::Renew,
            start_time: start,
            end_time: start + 0.5,
            status: OutcomeStatus::Ok,
            retry_count: 0,
        };

        // Two separate appends, as two runs would produce
        outcome::append_log(&path, &[make("b", 2.0), make("a", 1.0)]).unwrap();
        outcome::append_log(&path, &[make("c", 3.0)]).unwrap();

        let read = outcome::read_log(&path).unwrap();
        assert_eq!(read.len(), 3);

        let summary = summarize(&read, &SummaryFilter::default());
        assert_eq!(summary.counts.ok, 3);
        assert!(summary.throughput > 0.0);
    }
}
