//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use loanbench::orchestrator::RunReport;
use loanbench::{
    outcome, summarize, summarize_by_operation, Batch, DispatchSession, HarnessConfig,
    MetricsSummary, OperationMix, OrchestratorBuilder, RetryPlan, Signer, SummaryFilter,
    TcpTransport, Transport,
};
use tokio::sync::{broadcast, mpsc};

#[derive(Parser)]
#[command(name = "loanbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a deterministic request batch
    Generate {
        /// Number of requests
        #[arg(short = 'n', long, default_value_t = 25)]
        count: usize,

        /// Operation mix RENEW:RETURN:LOAN, e.g. "70:30:0"
        #[arg(long, default_value = "50:50:0")]
        mix: String,

        /// Seed for reproducible batches
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Output file (JSON Lines)
        #[arg(short, long, default_value = "batch.jsonl")]
        output: PathBuf,
    },
    /// Run a load-test experiment against the receiver
    Run {
        /// Total requests across all sessions
        #[arg(short = 'n', long, default_value_t = 100)]
        requests: usize,

        /// Number of dispatch sessions
        #[arg(short, long, default_value_t = 1)]
        sessions: usize,

        /// Operation mix RENEW:RETURN:LOAN
        #[arg(long, default_value = "50:50:0")]
        mix: String,

        /// Base seed; each session derives its own
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Scheduling mode: sequential or concurrent
        #[arg(long, default_value = "sequential")]
        mode: String,

        /// Receiver address, overrides GC_ADDR
        #[arg(long)]
        addr: Option<String>,

        /// Per-attempt reply timeout in seconds, overrides PS_TIMEOUT
        #[arg(long)]
        timeout: Option<f64>,

        /// Backoff schedule in seconds, e.g. "0.5,1,2,4", overrides PS_BACKOFF
        #[arg(long)]
        backoff: Option<String>,

        /// Run one session over a pre-generated batch file instead of
        /// generating requests
        #[arg(long)]
        batch: Option<PathBuf>,

        /// Outcome log to append to
        #[arg(long, default_value = "outcomes.log")]
        log: PathBuf,
    },
    /// Summarize an outcome log
    Summarize {
        /// Outcome log to read
        #[arg(long, default_value = "outcomes.log")]
        log: PathBuf,

        /// Restrict to one operation (RENEW, RETURN, LOAN)
        #[arg(long)]
        operation: Option<String>,

        /// Compute latency/throughput over every status, not just OK
        #[arg(long)]
        all_statuses: bool,

        /// Append the aggregate row to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

/// Dispatch the parsed command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate {
            count,
            mix,
            seed,
            output,
        } => generate(count, &mix, seed, &output),
        Commands::Run {
            requests,
            sessions,
            mix,
            seed,
            mode,
            addr,
            timeout,
            backoff,
            batch,
            log,
        } => {
            run(RunArgs {
                requests,
                sessions,
                mix,
                seed,
                mode,
                addr,
                timeout,
                backoff,
                batch,
                log,
            })
            .await
        }
        Commands::Summarize {
            log,
            operation,
            all_statuses,
            csv,
        } => summarize_log(&log, operation.as_deref(), all_statuses, csv.as_deref()),
    }
}

fn generate(count: usize, mix: &str, seed: u64, output: &Path) -> Result<()> {
    let mix: OperationMix = mix.parse()?;
    let batch = Batch::generate(count, &mix, seed)?;
    batch.write_jsonl(output)?;
    println!(
        "wrote {} requests to {} (mix={mix}, seed={seed})",
        batch.len(),
        output.display()
    );
    Ok(())
}

struct RunArgs {
    requests: usize,
    sessions: usize,
    mix: String,
    seed: u64,
    mode: String,
    addr: Option<String>,
    timeout: Option<f64>,
    backoff: Option<String>,
    batch: Option<PathBuf>,
    log: PathBuf,
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = HarnessConfig::from_env()?;
    if let Some(addr) = &args.addr {
        config.receiver_addr = addr.clone();
    }
    if let Some(timeout) = args.timeout {
        if !timeout.is_finite() || timeout <= 0.0 {
            anyhow::bail!("timeout must be positive, got {timeout}");
        }
        config.retry_plan.attempt_timeout = Duration::from_secs_f64(timeout);
    }
    if let Some(backoff) = &args.backoff {
        config.retry_plan.delays = RetryPlan::parse_delays(backoff)?;
    }
    config.validate()?;

    let signer = Signer::new(config.secret.clone());
    let transport = Arc::new(TcpTransport::new(config.receiver_addr.clone()));
    tracing::info!(
        addr = %config.receiver_addr,
        attempt_timeout_ms = config.retry_plan.attempt_timeout.as_millis() as u64,
        replay_window_s = config.replay_window.as_secs(),
        "dialing receiver"
    );

    let report = match &args.batch {
        Some(path) => run_batch_file(path, signer, transport, config.retry_plan.clone()).await?,
        None => {
            let orchestrator = OrchestratorBuilder::new()
                .total_requests(args.requests)
                .session_count(args.sessions)
                .mix(args.mix.parse()?)
                .seed(args.seed)
                .mode(args.mode.parse()?)
                .retry_plan(config.retry_plan.clone())
                .signer(signer)
                .transport(transport)
                .build()?;

            let shutdown = orchestrator.shutdown_handle();
            let signal = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, cancelling run");
                    let _ = shutdown.send(());
                }
            });

            let report = orchestrator.run().await?;
            signal.abort();
            report
        }
    };

    outcome::append_log(&args.log, &report.outcomes)?;

    let summary = summarize(&report.outcomes, &SummaryFilter::default());
    print_summary("run", &summary);
    if report.session_failures > 0 {
        println!("session failures: {}", report.session_failures);
    }
    println!("log: {}", args.log.display());
    Ok(())
}

/// Run a single session over a batch loaded from disk
async fn run_batch_file(
    path: &Path,
    signer: Signer,
    transport: Arc<TcpTransport>,
    retry_plan: RetryPlan,
) -> Result<RunReport> {
    let batch = Batch::read_jsonl(path)?;
    println!("loaded {} requests from {}", batch.len(), path.display());

    let (outcome_tx, mut outcome_rx) = mpsc::channel(10_000);
    let (shutdown_tx, _) = broadcast::channel(1);
    let shutdown_rx = shutdown_tx.subscribe();

    let signal = {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, cancelling session");
                let _ = shutdown_tx.send(());
            }
        })
    };

    let channel = transport
        .connect()
        .await
        .map_err(loanbench::Error::Channel)?;
    let mut session = DispatchSession::new(0, channel, signer, retry_plan, outcome_tx);
    let result = session.run(&batch, shutdown_rx).await;
    signal.abort();
    drop(session);

    let mut outcomes = Vec::new();
    while let Ok(outcome) = outcome_rx.try_recv() {
        outcomes.push(outcome);
    }

    let (session_stats, session_failures) = match result {
        Ok(stats) => (vec![stats], 0),
        Err(e) => {
            tracing::error!(error = %e, "session failed");
            (Vec::new(), 1)
        }
    };

    Ok(RunReport {
        outcomes,
        session_stats,
        session_failures,
    })
}

fn summarize_log(
    log: &Path,
    operation: Option<&str>,
    all_statuses: bool,
    csv: Option<&Path>,
) -> Result<()> {
    let outcomes = outcome::read_log(log)?;
    if outcomes.is_empty() {
        println!("no records in {}", log.display());
        return Ok(());
    }

    let mut filter = SummaryFilter::default();
    if all_statuses {
        filter = filter.all_statuses();
    }
    if let Some(op) = operation {
        filter = filter.with_operation(op.parse()?);
    }

    let title = log
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());

    let summary = summarize(&outcomes, &filter);
    print_summary(&title, &summary);

    if filter.operation.is_none() {
        for (op, breakdown) in summarize_by_operation(&outcomes, &filter) {
            print_summary(&format!("{title}-{op}"), &breakdown);
        }
    }

    if let Some(csv_path) = csv {
        append_csv(csv_path, &title, &summary)?;
        println!("csv: {}", csv_path.display());
    }
    Ok(())
}

fn print_summary(title: &str, summary: &MetricsSummary) {
    let counts = summary.counts;
    let latency = summary.latency;
    println!("\n== {title} ==");
    println!(
        "total: {}  (OK={} ERROR={} TIMEOUT={} ABANDONED={})",
        counts.total, counts.ok, counts.error, counts.timeout, counts.abandoned
    );
    println!(
        "span: {:.2}s   TPS: {:.2}",
        summary.span_secs, summary.throughput
    );
    println!(
        "latency [s]: mean={:.3}  p50={:.3}  p95={:.3}  max={:.3}  (n={})",
        latency.mean, latency.p50, latency.p95, latency.max, latency.count
    );
}

fn append_csv(path: &Path, scenario: &str, summary: &MetricsSummary) -> Result<()> {
    let exists = path.exists();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    if !exists {
        writeln!(file, "{}", loanbench::metrics::csv_header())?;
    }
    writeln!(file, "{}", summary.csv_row(scenario))?;
    Ok(())
}
