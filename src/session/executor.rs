//! Session execution loop

use crate::batch::Batch;
use crate::channel::{Channel, ChannelError, LockStepLink};
use crate::config::RetryPlan;
use crate::error::{Error, Result};
use crate::outcome::{epoch_now, Outcome, OutcomeStatus};
use crate::request::{Envelope, RequestIntent};
use crate::response::WireReply;
use crate::signing::Signer;

use super::stats::SessionStats;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};

/// How one request's dispatch concluded
enum Dispatch {
    /// Terminal outcome reached (OK, ERROR, or TIMEOUT)
    Terminal(Outcome),
    /// Channel-fatal failure; the outcome is this request's abandonment
    Fatal(Outcome, ChannelError),
    /// Cancellation observed mid-request
    Cancelled(Outcome),
}

/// Works through one batch slice over one lock-step channel
///
/// Emits exactly one [`Outcome`] per input request, in submission order,
/// through the outcome channel handed in at construction.
pub struct DispatchSession {
    /// Session identifier, used in logs and derived seeds
    id: usize,

    /// The guarded request/reply channel
    link: LockStepLink,

    /// Signs every attempt with the shared secret
    signer: Signer,

    /// Backoff schedule and per-attempt timeout
    retry_plan: RetryPlan,

    /// Outcome sink (collector owned by the orchestrator)
    outcome_tx: mpsc::Sender<Outcome>,
}

impl DispatchSession {
    /// Create a session over a raw channel
    pub fn new(
        id: usize,
        channel: Box<dyn Channel>,
        signer: Signer,
        retry_plan: RetryPlan,
        outcome_tx: mpsc::Sender<Outcome>,
    ) -> Self {
        Self {
            id,
            link: LockStepLink::new(channel),
            signer,
            retry_plan,
            outcome_tx,
        }
    }

    /// Session identifier
    pub fn id(&self) -> usize {
        self.id
    }

    /// Recover the underlying channel for serial reuse
    pub fn into_channel(self) -> Box<dyn Channel> {
        self.link.into_inner()
    }

    /// Run the session over its batch slice
    ///
    /// Returns stats on normal completion (including cancellation, which
    /// abandons the remainder); returns the channel error after a fatal
    /// failure, with every unfinished request already emitted as abandoned.
    pub async fn run(
        &mut self,
        batch: &Batch,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<SessionStats> {
        let mut stats = SessionStats::new();
        stats.start();

        tracing::debug!(session_id = self.id, requests = batch.len(), "session started");

        let requests = batch.requests();
        let mut idx = 0;
        while idx < requests.len() {
            // Catch a cancellation that arrived between requests
            if shutdown_signalled(&mut shutdown) {
                tracing::debug!(session_id = self.id, "session cancelled");
                self.abandon_rest(&requests[idx..], &mut stats).await;
                break;
            }

            match self.dispatch_one(&requests[idx], &mut shutdown).await {
                Dispatch::Terminal(outcome) => {
                    stats.record(outcome.status);
                    self.emit(outcome).await;
                    idx += 1;
                }
                Dispatch::Cancelled(outcome) => {
                    tracing::debug!(session_id = self.id, "session cancelled mid-request");
                    stats.record(outcome.status);
                    self.emit(outcome).await;
                    self.abandon_rest(&requests[idx + 1..], &mut stats).await;
                    break;
                }
                Dispatch::Fatal(outcome, error) => {
                    stats.record(outcome.status);
                    self.emit(outcome).await;
                    self.abandon_rest(&requests[idx + 1..], &mut stats).await;
                    stats.stop();
                    tracing::error!(
                        session_id = self.id,
                        error = %error,
                        "session channel failure"
                    );
                    return Err(Error::Channel(error));
                }
            }
        }

        stats.stop();
        tracing::debug!(
            session_id = self.id,
            ok = stats.ok,
            rejected = stats.rejected,
            timeouts = stats.timeouts,
            abandoned = stats.abandoned,
            "session finished"
        );
        Ok(stats)
    }

    /// Dispatch one request through its full retry sequence
    async fn dispatch_one(
        &mut self,
        intent: &RequestIntent,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Dispatch {
        let start = epoch_now();
        let mut attempt: u32 = 0;

        loop {
            // Refresh timestamp/nonce and recompute the tag before every
            // send, so each attempt sits inside the replay window no matter
            // how much backoff has accumulated.
            let envelope = Envelope::fresh();
            let wire = self.signer.seal(intent, &envelope);
            let payload = match serde_json::to_vec(&wire) {
                Ok(payload) => payload,
                Err(e) => {
                    return Dispatch::Fatal(
                        self.abandoned(intent, start, attempt),
                        ChannelError::Malformed(format!("request encode: {e}")),
                    )
                }
            };

            if let Err(e) = self.link.send(&payload).await {
                return Dispatch::Fatal(self.abandoned(intent, start, attempt), e);
            }

            // The select yields None on cancellation; the outcome is built
            // afterwards, once the recv future has released the link.
            let awaited = tokio::select! {
                biased;

                _ = shutdown.recv() => None,

                reply = self.link.recv(self.retry_plan.attempt_timeout) => Some(reply),
            };
            let Some(reply) = awaited else {
                return Dispatch::Cancelled(self.abandoned(intent, start, attempt));
            };

            match reply {
                Ok(raw) => {
                    return match self.conclude(intent, start, attempt, &raw) {
                        Ok(outcome) => Dispatch::Terminal(outcome),
                        Err(e) => Dispatch::Fatal(self.abandoned(intent, start, attempt), e),
                    };
                }
                Err(ChannelError::Timeout(_)) => {
                    let Some(delay) = self.retry_plan.delays.get(attempt as usize).copied()
                    else {
                        // Schedule exhausted
                        return Dispatch::Terminal(Outcome {
                            request_id: intent.request_id.clone(),
                            operation: intent.operation,
                            start_time: start,
                            end_time: epoch_now(),
                            status: OutcomeStatus::Timeout,
                            retry_count: attempt,
                        });
                    };

                    tracing::debug!(
                        session_id = self.id,
                        request_id = %intent.request_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "attempt timed out, backing off"
                    );

                    tokio::select! {
                        biased;

                        _ = shutdown.recv() => {
                            return Dispatch::Cancelled(
                                self.abandoned(intent, start, attempt),
                            );
                        }

                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    return Dispatch::Fatal(self.abandoned(intent, start, attempt), e);
                }
            }
        }
    }

    /// Decode a reply and turn it into this request's terminal outcome
    fn conclude(
        &self,
        intent: &RequestIntent,
        start: f64,
        attempt: u32,
        raw: &[u8],
    ) -> std::result::Result<Outcome, ChannelError> {
        let reply: WireReply = serde_json::from_slice(raw)
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;

        if reply.request_id != intent.request_id {
            return Err(ChannelError::Desync {
                expected: intent.request_id.to_string(),
                got: reply.request_id.to_string(),
            });
        }

        let status = if reply.status.is_ok() {
            OutcomeStatus::Ok
        } else {
            // Rejection is authoritative; no further retries
            OutcomeStatus::Error
        };

        Ok(Outcome {
            request_id: intent.request_id.clone(),
            operation: intent.operation,
            start_time: start,
            end_time: epoch_now(),
            status,
            retry_count: attempt,
        })
    }

    /// Abandonment outcome for the request currently in flight
    fn abandoned(&self, intent: &RequestIntent, start: f64, attempt: u32) -> Outcome {
        Outcome {
            request_id: intent.request_id.clone(),
            operation: intent.operation,
            start_time: start,
            end_time: epoch_now(),
            status: OutcomeStatus::Abandoned,
            retry_count: attempt,
        }
    }

    /// Emit abandonment outcomes for never-attempted requests
    async fn abandon_rest(&self, rest: &[RequestIntent], stats: &mut SessionStats) {
        for intent in rest {
            let now = epoch_now();
            let outcome = Outcome {
                request_id: intent.request_id.clone(),
                operation: intent.operation,
                start_time: now,
                end_time: now,
                status: OutcomeStatus::Abandoned,
                retry_count: 0,
            };
            stats.record(outcome.status);
            self.emit(outcome).await;
        }
    }

    /// Send one outcome to the collector
    async fn emit(&self, outcome: Outcome) {
        if self.outcome_tx.send(outcome).await.is_err() {
            tracing::warn!(session_id = self.id, "outcome collector closed");
        }
    }
}

impl std::fmt::Debug for DispatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchSession")
            .field("id", &self.id)
            .field("link", &self.link)
            .field("retry_plan", &self.retry_plan)
            .finish()
    }
}

/// Check for a pending cancellation without blocking
fn shutdown_signalled(rx: &mut broadcast::Receiver<()>) -> bool {
    match rx.try_recv() {
        Ok(()) | Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
    }
}
