//! Metrics aggregation over outcome logs
//!
//! Decoupled from the dispatch pipeline: the engine only needs outcome
//! records, so it runs equally on a just-finished run or on a historical
//! log read back from disk.

use crate::outcome::{Outcome, OutcomeStatus};
use crate::request::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which outcomes feed the summary
#[derive(Debug, Clone, Copy)]
pub struct SummaryFilter {
    /// Restrict the whole summary to one operation kind
    pub operation: Option<Operation>,

    /// Status whose outcomes feed latency and throughput; `None` includes
    /// every status
    pub latency_status: Option<OutcomeStatus>,
}

impl Default for SummaryFilter {
    /// Latency over accepted requests only, all operations
    fn default() -> Self {
        Self {
            operation: None,
            latency_status: Some(OutcomeStatus::Ok),
        }
    }
}

impl SummaryFilter {
    /// Restrict to one operation kind
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Include every status in latency and throughput
    pub fn all_statuses(mut self) -> Self {
        self.latency_status = None;
        self
    }
}

/// Outcome counts per terminal status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// All outcomes in the set
    pub total: usize,
    /// Accepted
    pub ok: usize,
    /// Rejected
    pub error: usize,
    /// Retry schedule exhausted
    pub timeout: usize,
    /// Session failure or cancellation
    pub abandoned: usize,
}

impl StatusCounts {
    fn from_outcomes(outcomes: &[&Outcome]) -> Self {
        let mut counts = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.status {
                OutcomeStatus::Ok => counts.ok += 1,
                OutcomeStatus::Error => counts.error += 1,
                OutcomeStatus::Timeout => counts.timeout += 1,
                OutcomeStatus::Abandoned => counts.abandoned += 1,
            }
        }
        counts
    }
}

/// Latency distribution in seconds
///
/// Percentiles use the nearest-rank rule on the sorted sequence:
/// `rank = ceil(p/100 * n)`, 1-based. Deterministic for a fixed input, so
/// results reproduce across implementations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Number of samples
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Median (nearest rank)
    pub p50: f64,
    /// 95th percentile (nearest rank)
    pub p95: f64,
    /// Largest sample
    pub max: f64,
}

impl LatencyStats {
    /// Compute stats from raw latency samples
    ///
    /// An empty input yields zeroed stats, never a panic.
    pub fn from_latencies(latencies: &[f64]) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<f64> = latencies.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;

        Self {
            count,
            mean,
            p50: nearest_rank(&sorted, 50.0),
            p95: nearest_rank(&sorted, 95.0),
            max: sorted[count - 1],
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted slice
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Aggregated statistics for one outcome set
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Outcome counts per status
    pub counts: StatusCounts,

    /// Latency distribution of the filtered subset
    pub latency: LatencyStats,

    /// Wall-clock span of the filtered subset in seconds
    pub span_secs: f64,

    /// Accepted requests per second of wall-clock span; 0 when undefined
    pub throughput: f64,
}

/// Summarize an outcome log
///
/// Counts cover every outcome in the (operation-filtered) set, so each
/// submitted request is accounted for exactly once. Latency and throughput
/// cover the status-filtered subset; throughput is `ok / span` and reported
/// as 0 rather than dividing by a degenerate span.
pub fn summarize(outcomes: &[Outcome], filter: &SummaryFilter) -> MetricsSummary {
    let set: Vec<&Outcome> = outcomes
        .iter()
        .filter(|o| filter.operation.map_or(true, |op| o.operation == op))
        .collect();

    let counts = StatusCounts::from_outcomes(&set);

    let subset: Vec<&Outcome> = set
        .iter()
        .copied()
        .filter(|o| filter.latency_status.map_or(true, |s| o.status == s))
        .collect();

    let latencies: Vec<f64> = subset.iter().map(|o| o.latency()).collect();
    let latency = LatencyStats::from_latencies(&latencies);

    let (span_secs, throughput) = if subset.len() < 2 {
        (0.0, 0.0)
    } else {
        let first_start = subset
            .iter()
            .map(|o| o.start_time)
            .fold(f64::INFINITY, f64::min);
        let last_end = subset
            .iter()
            .map(|o| o.end_time)
            .fold(f64::NEG_INFINITY, f64::max);
        let span = last_end - first_start;
        if span > 0.0 {
            let ok = subset
                .iter()
                .filter(|o| o.status == OutcomeStatus::Ok)
                .count();
            (span, ok as f64 / span)
        } else {
            (0.0, 0.0)
        }
    };

    MetricsSummary {
        counts,
        latency,
        span_secs,
        throughput,
    }
}

/// Summarize with a per-operation breakdown
pub fn summarize_by_operation(
    outcomes: &[Outcome],
    filter: &SummaryFilter,
) -> BTreeMap<Operation, MetricsSummary> {
    let mut by_operation = BTreeMap::new();
    for operation in [Operation::Renew, Operation::Return, Operation::Loan] {
        if outcomes.iter().any(|o| o.operation == operation) {
            let filter = filter.with_operation(operation);
            by_operation.insert(operation, summarize(outcomes, &filter));
        }
    }
    by_operation
}

/// CSV header matching the aggregate-export format of the log tooling
pub fn csv_header() -> &'static str {
    "scenario,total,ok,error,timeout,period_s,tps,lat_mean_s,lat_p50_s,lat_p95_s,lat_max_s"
}

impl MetricsSummary {
    /// One CSV row under [`csv_header`]
    pub fn csv_row(&self, scenario: &str) -> String {
        format!(
            "{},{},{},{},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3}",
            scenario,
            self.counts.total,
            self.counts.ok,
            self.counts.error,
            self.counts.timeout,
            self.span_secs,
            self.throughput,
            self.latency.mean,
            self.latency.p50,
            self.latency.p95,
            self.latency.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestId;

    fn outcome(
        id: &str,
        operation: Operation,
        start: f64,
        end: f64,
        status: OutcomeStatus,
    ) -> Outcome {
        Outcome {
            request_id: RequestId::from(id),
            operation,
            start_time: start,
            end_time: end,
            status,
            retry_count: 0,
        }
    }

    /// 100 accepted outcomes, one per second, each with latency i/100 s
    fn uniform_log() -> Vec<Outcome> {
        (1..=100)
            .map(|i| {
                let start = 1000.0 + i as f64;
                outcome(
                    &format!("req-{i}"),
                    Operation::Renew,
                    start,
                    start + i as f64 / 100.0,
                    OutcomeStatus::Ok,
                )
            })
            .collect()
    }

    #[test]
    fn test_nearest_rank_rule() {
        let sorted: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        assert_eq!(nearest_rank(&sorted, 50.0), 50.0);
        assert_eq!(nearest_rank(&sorted, 95.0), 95.0);
        assert_eq!(nearest_rank(&sorted, 100.0), 100.0);

        let small = [10.0, 20.0, 30.0];
        assert_eq!(nearest_rank(&small, 50.0), 20.0);
        assert_eq!(nearest_rank(&small, 95.0), 30.0);
    }

    #[test]
    fn test_latency_stats_empty() {
        let stats = LatencyStats::from_latencies(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.max, 0.0);
    }

    #[test]
    fn test_latency_stats_single_value() {
        let stats = LatencyStats::from_latencies(&[0.25]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, 0.25);
        assert_eq!(stats.p50, 0.25);
        assert_eq!(stats.p95, 0.25);
        assert_eq!(stats.max, 0.25);
    }

    #[test]
    fn test_uniform_log_statistics() {
        let summary = summarize(&uniform_log(), &SummaryFilter::default());

        assert_eq!(summary.counts.total, 100);
        assert_eq!(summary.counts.ok, 100);
        assert_eq!(summary.latency.count, 100);
        // Latencies are 0.01..=1.00 s
        assert!((summary.latency.mean - 0.505).abs() < 1e-9);
        assert!((summary.latency.p50 - 0.50).abs() < 1e-9);
        assert!((summary.latency.p95 - 0.95).abs() < 1e-9);
        assert!((summary.latency.max - 1.00).abs() < 1e-9);

        // Span runs from the first start (1001.0) to the last end (1101.0)
        assert!((summary.span_secs - 100.0).abs() < 1e-9);
        assert!((summary.throughput - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_log_is_well_defined() {
        let summary = summarize(&[], &SummaryFilter::default());
        assert_eq!(summary.counts.total, 0);
        assert_eq!(summary.throughput, 0.0);
        assert_eq!(summary.span_secs, 0.0);
    }

    #[test]
    fn test_all_failed_log_is_well_defined() {
        let outcomes = vec![
            outcome("a", Operation::Renew, 1.0, 3.0, OutcomeStatus::Timeout),
            outcome("b", Operation::Return, 2.0, 4.0, OutcomeStatus::Error),
        ];
        let summary = summarize(&outcomes, &SummaryFilter::default());

        // Everything is counted, but no OK outcome feeds latency/throughput
        assert_eq!(summary.counts.total, 2);
        assert_eq!(summary.counts.timeout, 1);
        assert_eq!(summary.counts.error, 1);
        assert_eq!(summary.latency.count, 0);
        assert_eq!(summary.throughput, 0.0);
    }

    #[test]
    fn test_single_outcome_throughput_undefined() {
        let outcomes = vec![outcome("a", Operation::Renew, 1.0, 2.0, OutcomeStatus::Ok)];
        let summary = summarize(&outcomes, &SummaryFilter::default());
        assert_eq!(summary.throughput, 0.0);
        assert_eq!(summary.latency.count, 1);
    }

    #[test]
    fn test_zero_span_throughput_undefined() {
        let outcomes = vec![
            outcome("a", Operation::Renew, 1.0, 1.0, OutcomeStatus::Ok),
            outcome("b", Operation::Renew, 1.0, 1.0, OutcomeStatus::Ok),
        ];
        let summary = summarize(&outcomes, &SummaryFilter::default());
        assert_eq!(summary.throughput, 0.0);
    }

    #[test]
    fn test_operation_filter() {
        let outcomes = vec![
            outcome("a", Operation::Renew, 1.0, 2.0, OutcomeStatus::Ok),
            outcome("b", Operation::Return, 2.0, 3.0, OutcomeStatus::Ok),
            outcome("c", Operation::Return, 3.0, 4.0, OutcomeStatus::Timeout),
        ];
        let filter = SummaryFilter::default().with_operation(Operation::Return);
        let summary = summarize(&outcomes, &filter);

        assert_eq!(summary.counts.total, 2);
        assert_eq!(summary.counts.ok, 1);
        assert_eq!(summary.counts.timeout, 1);
        assert_eq!(summary.latency.count, 1);
    }

    #[test]
    fn test_all_statuses_filter_includes_failures() {
        let outcomes = vec![
            outcome("a", Operation::Renew, 1.0, 2.0, OutcomeStatus::Ok),
            outcome("b", Operation::Renew, 2.0, 6.0, OutcomeStatus::Timeout),
        ];
        let summary = summarize(&outcomes, &SummaryFilter::default().all_statuses());

        assert_eq!(summary.latency.count, 2);
        assert!((summary.latency.max - 4.0).abs() < 1e-9);
        // Throughput still counts only accepted requests over the span
        assert!((summary.span_secs - 5.0).abs() < 1e-9);
        assert!((summary.throughput - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_breakdown_by_operation() {
        let outcomes = vec![
            outcome("a", Operation::Renew, 1.0, 2.0, OutcomeStatus::Ok),
            outcome("b", Operation::Return, 2.0, 3.0, OutcomeStatus::Ok),
        ];
        let breakdown = summarize_by_operation(&outcomes, &SummaryFilter::default());

        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[&Operation::Renew].counts.total, 1);
        assert_eq!(breakdown[&Operation::Return].counts.total, 1);
        assert!(!breakdown.contains_key(&Operation::Loan));
    }

    #[test]
    fn test_csv_row_shape() {
        let summary = summarize(&uniform_log(), &SummaryFilter::default());
        let row = summary.csv_row("baseline");
        assert!(row.starts_with("baseline,100,100,0,0,"));
        assert_eq!(row.split(',').count(), csv_header().split(',').count());
    }
}
