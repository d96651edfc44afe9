//! Orchestrator for multi-session runs
//!
//! The orchestrator partitions a request total across independent dispatch
//! sessions, schedules them sequentially (one shared channel) or
//! concurrently (one channel each), funnels every outcome through a single
//! collector, and hands back one consolidated log sorted by start time.
//! A fatal failure in one session never aborts its siblings; the failed
//! session's remaining requests surface as abandoned outcomes so every
//! submitted request is accounted for exactly once.
//!
//! # Example
//!
//! ```ignore
//! use loanbench::orchestrator::{OrchestratorBuilder, RunMode};
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .total_requests(1000)
//!     .session_count(8)
//!     .mode(RunMode::Concurrent)
//!     .seed(42)
//!     .signer(signer)
//!     .transport(transport)
//!     .build()?;
//!
//! let report = orchestrator.run().await?;
//! println!("outcomes: {}", report.outcomes.len());
//! ```

mod builder;
mod executor;

pub use builder::OrchestratorBuilder;
pub use executor::{Orchestrator, RunMode, RunReport};
