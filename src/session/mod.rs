//! Dispatch session: the lock-step execution unit
//!
//! A session owns one request/reply channel and works through its slice of
//! a batch strictly in order: seal a fresh envelope, send, await the reply
//! within the per-attempt timeout, and either conclude the request or back
//! off and resend. The channel is inherently serial, so a session has no
//! internal concurrency; concurrency lives in the orchestrator, which runs
//! many sessions side by side.
//!
//! Per request the session moves through send -> await-reply and ends in
//! one of four terminal states: accepted, rejected, retry schedule
//! exhausted, or abandoned (channel failure / cancellation). Exactly one
//! outcome is emitted per request, in submission order.

mod executor;
mod stats;

pub use executor::DispatchSession;
pub use stats::SessionStats;
