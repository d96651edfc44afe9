//! Orchestrator execution logic

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::batch::{Batch, OperationMix};
use crate::channel::{Channel, Transport};
use crate::config::RetryPlan;
use crate::error::{Error, Result};
use crate::outcome::{epoch_now, Outcome, OutcomeStatus};
use crate::session::{DispatchSession, SessionStats};
use crate::signing::Signer;

/// How sessions are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Sessions run one after another over a single shared channel;
    /// simplest and least contended
    Sequential,
    /// Sessions run in parallel, each over its own channel
    Concurrent,
}

impl FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(RunMode::Sequential),
            "concurrent" => Ok(RunMode::Concurrent),
            other => Err(Error::Config(format!("unknown run mode: {other}"))),
        }
    }
}

/// Consolidated result of one orchestrated run
#[derive(Debug)]
pub struct RunReport {
    /// Every outcome of the run, sorted by start time
    pub outcomes: Vec<Outcome>,

    /// Stats of the sessions that completed
    pub session_stats: Vec<SessionStats>,

    /// Number of sessions that ended in a fatal channel error
    pub session_failures: usize,
}

/// Runs K dispatch sessions over disjoint slices of a request total
///
/// Use [`super::OrchestratorBuilder`] for construction.
pub struct Orchestrator {
    pub(crate) total_requests: usize,
    pub(crate) session_count: usize,
    pub(crate) mix: OperationMix,
    pub(crate) seed: u64,
    pub(crate) mode: RunMode,
    pub(crate) retry_plan: RetryPlan,
    pub(crate) signer: Signer,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) outcome_buffer: usize,
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Trigger cancellation of every running session
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// A handle external tasks (signal handlers) can use to cancel the run
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the experiment and consolidate every session's outcomes
    pub async fn run(&self) -> Result<RunReport> {
        let slice_sizes = partition(self.total_requests, self.session_count);

        // Each session gets its own deterministic slice; deriving the seed
        // from the session index keeps request ids disjoint across sessions
        // while the whole run stays reproducible.
        let mut batches = Vec::with_capacity(slice_sizes.len());
        for (idx, len) in slice_sizes.iter().enumerate() {
            batches.push(Batch::generate(*len, &self.mix, self.seed + idx as u64)?);
        }

        // Single collector: the consolidated log has one logical writer, so
        // records from concurrent sessions can never interleave mid-record.
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Outcome>(self.outcome_buffer);
        let collector = tokio::spawn(async move {
            let mut all = Vec::new();
            while let Some(outcome) = outcome_rx.recv().await {
                all.push(outcome);
            }
            all
        });

        // Subscribe every session before any of them starts, so a signal
        // fired during an early sequential session still reaches later ones.
        let shutdown_rxs: Vec<broadcast::Receiver<()>> = (0..batches.len())
            .map(|_| self.shutdown_tx.subscribe())
            .collect();

        tracing::info!(
            total_requests = self.total_requests,
            sessions = self.session_count,
            mode = ?self.mode,
            seed = self.seed,
            "starting run"
        );

        let mut session_stats = Vec::new();
        let mut session_failures = 0usize;

        match self.mode {
            RunMode::Concurrent => {
                let mut handles = Vec::with_capacity(batches.len());
                for (idx, (batch, shutdown_rx)) in
                    batches.into_iter().zip(shutdown_rxs).enumerate()
                {
                    let transport = Arc::clone(&self.transport);
                    let signer = self.signer.clone();
                    let plan = self.retry_plan.clone();
                    let tx = outcome_tx.clone();

                    handles.push(tokio::spawn(async move {
                        let channel = match transport.connect().await {
                            Ok(channel) => channel,
                            Err(e) => {
                                abandon_batch(&batch, &tx).await;
                                return Err(Error::Channel(e));
                            }
                        };
                        let mut session = DispatchSession::new(idx, channel, signer, plan, tx);
                        session.run(&batch, shutdown_rx).await
                    }));
                }

                for (idx, handle) in handles.into_iter().enumerate() {
                    match handle.await {
                        Ok(Ok(stats)) => session_stats.push(stats),
                        Ok(Err(e)) => {
                            session_failures += 1;
                            tracing::error!(session_id = idx, error = %e, "session failed");
                        }
                        Err(e) => {
                            session_failures += 1;
                            tracing::error!(session_id = idx, error = %e, "session task panicked");
                        }
                    }
                }
            }
            RunMode::Sequential => {
                let mut shared_channel: Option<Box<dyn Channel>> = None;
                for (idx, (batch, shutdown_rx)) in
                    batches.into_iter().zip(shutdown_rxs).enumerate()
                {
                    let channel = match shared_channel.take() {
                        Some(channel) => channel,
                        None => match self.transport.connect().await {
                            Ok(channel) => channel,
                            Err(e) => {
                                session_failures += 1;
                                tracing::error!(session_id = idx, error = %e, "connect failed");
                                abandon_batch(&batch, &outcome_tx).await;
                                continue;
                            }
                        },
                    };

                    let mut session = DispatchSession::new(
                        idx,
                        channel,
                        self.signer.clone(),
                        self.retry_plan.clone(),
                        outcome_tx.clone(),
                    );
                    match session.run(&batch, shutdown_rx).await {
                        Ok(stats) => {
                            session_stats.push(stats);
                            // Hand the channel to the next session
                            shared_channel = Some(session.into_channel());
                        }
                        Err(e) => {
                            session_failures += 1;
                            tracing::error!(session_id = idx, error = %e, "session failed");
                            // The link is poisoned; the next session reconnects
                        }
                    }
                }
            }
        }

        // Dropping the last sender lets the collector drain and finish
        drop(outcome_tx);
        let mut outcomes = collector
            .await
            .map_err(|e| Error::Orchestration(format!("collector task failed: {e}")))?;

        outcomes.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::info!(
            outcomes = outcomes.len(),
            session_failures,
            "run complete"
        );

        Ok(RunReport {
            outcomes,
            session_stats,
            session_failures,
        })
    }

    /// Run with a deadline; triggers cancellation when it expires
    pub async fn run_with_timeout(&self, timeout: Duration) -> Result<RunReport> {
        let shutdown_tx = self.shutdown_tx.clone();

        let timeout_handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::info!("deadline reached, cancelling sessions");
            let _ = shutdown_tx.send(());
        });

        let result = self.run().await;
        timeout_handle.abort();
        result
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("total_requests", &self.total_requests)
            .field("session_count", &self.session_count)
            .field("mix", &self.mix)
            .field("seed", &self.seed)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Split `total` across `sessions` as evenly as possible, remainder to the
/// first sessions
fn partition(total: usize, sessions: usize) -> Vec<usize> {
    let base = total / sessions;
    let remainder = total % sessions;
    (0..sessions)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

/// Account for a batch whose session never got off the ground
async fn abandon_batch(batch: &Batch, tx: &mpsc::Sender<Outcome>) {
    for intent in batch.requests() {
        let now = epoch_now();
        let outcome = Outcome {
            request_id: intent.request_id.clone(),
            operation: intent.operation,
            start_time: now,
            end_time: now,
            status: OutcomeStatus::Abandoned,
            retry_count: 0,
        };
        if tx.send(outcome).await.is_err() {
            tracing::warn!("outcome collector closed while abandoning batch");
            break;
        }
    }
}

#[cfg(test)]
mod partition_tests {
    use super::*;

    #[test]
    fn test_partition_even() {
        assert_eq!(partition(10, 2), vec![5, 5]);
    }

    #[test]
    fn test_partition_remainder_to_first() {
        assert_eq!(partition(10, 3), vec![4, 3, 3]);
        assert_eq!(partition(7, 4), vec![2, 2, 2, 1]);
    }

    #[test]
    fn test_partition_more_sessions_than_requests() {
        assert_eq!(partition(2, 4), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("sequential".parse::<RunMode>().unwrap(), RunMode::Sequential);
        assert_eq!("Concurrent".parse::<RunMode>().unwrap(), RunMode::Concurrent);
        assert!("parallel".parse::<RunMode>().is_err());
    }
}
