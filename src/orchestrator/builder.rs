//! Builder pattern for Orchestrator construction

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::batch::OperationMix;
use crate::channel::Transport;
use crate::config::RetryPlan;
use crate::error::{Error, Result};
use crate::signing::Signer;

use super::executor::{Orchestrator, RunMode};

/// Default collector buffer, sized so sessions never block on emission
const DEFAULT_OUTCOME_BUFFER: usize = 10_000;

/// Builder for creating an [`Orchestrator`] with validated configuration
pub struct OrchestratorBuilder {
    total_requests: usize,
    session_count: usize,
    mix: OperationMix,
    seed: u64,
    mode: RunMode,
    retry_plan: RetryPlan,
    outcome_buffer: usize,
    signer: Option<Signer>,
    transport: Option<Arc<dyn Transport>>,
}

impl OrchestratorBuilder {
    /// Create a builder with defaults (100 requests, 1 session, sequential)
    pub fn new() -> Self {
        Self {
            total_requests: 100,
            session_count: 1,
            mix: OperationMix::default(),
            seed: 0,
            mode: RunMode::Sequential,
            retry_plan: RetryPlan::default(),
            outcome_buffer: DEFAULT_OUTCOME_BUFFER,
            signer: None,
            transport: None,
        }
    }

    /// Total requests across all sessions
    pub fn total_requests(mut self, total: usize) -> Self {
        self.total_requests = total;
        self
    }

    /// Number of dispatch sessions
    pub fn session_count(mut self, count: usize) -> Self {
        self.session_count = count;
        self
    }

    /// Operation mix applied to every session's slice
    pub fn mix(mut self, mix: OperationMix) -> Self {
        self.mix = mix;
        self
    }

    /// Base seed; each session derives its own from this plus its index
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Scheduling mode
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Retry/backoff schedule shared by every session
    pub fn retry_plan(mut self, plan: RetryPlan) -> Self {
        self.retry_plan = plan;
        self
    }

    /// Outcome collector buffer size
    pub fn outcome_buffer(mut self, size: usize) -> Self {
        self.outcome_buffer = size;
        self
    }

    /// Request signer
    pub fn signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Channel transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    /// Returns an error if signer or transport are missing, or if any
    /// setting fails validation.
    pub fn build(self) -> Result<Orchestrator> {
        let signer = self
            .signer
            .ok_or_else(|| Error::Config("missing signer".into()))?;
        let transport = self
            .transport
            .ok_or_else(|| Error::Config("missing transport".into()))?;

        if self.total_requests == 0 {
            return Err(Error::Config("total requests must be at least 1".into()));
        }
        if self.session_count == 0 {
            return Err(Error::Config("session count must be at least 1".into()));
        }
        self.mix.validate()?;
        self.retry_plan
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Orchestrator {
            total_requests: self.total_requests,
            session_count: self.session_count,
            mix: self.mix,
            seed: self.seed,
            mode: self.mode,
            retry_plan: self.retry_plan,
            signer,
            transport,
            outcome_buffer: self.outcome_buffer,
            shutdown_tx,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
