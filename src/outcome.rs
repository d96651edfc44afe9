//! Outcome records and the line-oriented outcome log
//!
//! One record per request, written as a single pipe-delimited line:
//!
//! ```text
//! request_id=<id>|operation=<OP>|start=<epoch>|end=<epoch>|status=<S>|retries=<n>
//! ```
//!
//! Lines parse independent of their order in the file, so consolidated logs
//! from several runs can be concatenated and re-read.

use crate::error::{Error, Result};
use crate::request::{Operation, RequestId};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

/// Terminal status of one request's full retry sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    /// Reply received, request accepted
    Ok,
    /// Reply received, request rejected (authoritative, not retried)
    Error,
    /// Retry schedule exhausted without any reply
    Timeout,
    /// Session failed or was cancelled before a terminal reply
    Abandoned,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Ok => write!(f, "OK"),
            OutcomeStatus::Error => write!(f, "ERROR"),
            OutcomeStatus::Timeout => write!(f, "TIMEOUT"),
            OutcomeStatus::Abandoned => write!(f, "ABANDONED"),
        }
    }
}

impl FromStr for OutcomeStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OK" => Ok(OutcomeStatus::Ok),
            "ERROR" => Ok(OutcomeStatus::Error),
            "TIMEOUT" => Ok(OutcomeStatus::Timeout),
            "ABANDONED" => Ok(OutcomeStatus::Abandoned),
            other => Err(Error::Log(format!("unknown status: {other}"))),
        }
    }
}

/// Terminal result of one request, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// The request this outcome concludes
    pub request_id: RequestId,

    /// Operation kind
    pub operation: Operation,

    /// Epoch seconds of the first transmission attempt
    pub start_time: f64,

    /// Epoch seconds when the terminal status was assigned
    pub end_time: f64,

    /// Terminal status
    pub status: OutcomeStatus,

    /// Attempts beyond the first
    pub retry_count: u32,
}

impl Outcome {
    /// Wall-clock latency in seconds
    pub fn latency(&self) -> f64 {
        self.end_time - self.start_time
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "request_id={}|operation={}|start={:.6}|end={:.6}|status={}|retries={}",
            self.request_id,
            self.operation,
            self.start_time,
            self.end_time,
            self.status,
            self.retry_count
        )
    }
}

impl FromStr for Outcome {
    type Err = Error;

    /// Parse one log line; fields may appear in any order
    fn from_str(line: &str) -> Result<Self> {
        let mut request_id = None;
        let mut operation = None;
        let mut start_time = None;
        let mut end_time = None;
        let mut status = None;
        let mut retry_count = 0u32;

        for field in line.trim().split('|') {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| Error::Log(format!("malformed field: {field:?}")))?;
            match key {
                "request_id" => request_id = Some(RequestId::from(value)),
                "operation" => operation = Some(value.parse()?),
                "start" => {
                    start_time = Some(value.parse().map_err(|_| {
                        Error::Log(format!("bad start timestamp: {value:?}"))
                    })?)
                }
                "end" => {
                    end_time = Some(
                        value
                            .parse()
                            .map_err(|_| Error::Log(format!("bad end timestamp: {value:?}")))?,
                    )
                }
                "status" => status = Some(value.parse()?),
                "retries" => {
                    retry_count = value
                        .parse()
                        .map_err(|_| Error::Log(format!("bad retry count: {value:?}")))?
                }
                _ => {} // Unknown fields are tolerated for forward compatibility
            }
        }

        let missing = |name| Error::Log(format!("missing field {name} in line: {line:?}"));
        Ok(Self {
            request_id: request_id.ok_or_else(|| missing("request_id"))?,
            operation: operation.ok_or_else(|| missing("operation"))?,
            start_time: start_time.ok_or_else(|| missing("start"))?,
            end_time: end_time.ok_or_else(|| missing("end"))?,
            status: status.ok_or_else(|| missing("status"))?,
            retry_count,
        })
    }
}

/// Current wall-clock time as fractional epoch seconds
pub(crate) fn epoch_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

/// Append outcome records to a log file, one line per record
pub fn append_log(path: impl AsRef<Path>, outcomes: &[Outcome]) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for outcome in outcomes {
        writeln!(writer, "{outcome}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read every parseable record from a log file
///
/// Blank and foreign lines are skipped, matching the tolerant readers the
/// surrounding shell tooling uses on mixed process output.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<Outcome>> {
    let file = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut outcomes = Vec::new();
    for line in file.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse() {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::debug!(error = %e, "skipping unparseable log line"),
        }
    }
    Ok(outcomes)
}
