//! statewait-sim - 使用脚本化状态序列演示收敛轮询器
//!
//! Usage:
//!   statewait-sim --pending A,B --target C --sequence A,A,C [--interval-ms N] [--timeout-ms N]
//!
//! The scripted sequence is replayed one entry per probe; the last entry repeats.
//! Exit code: 0 converged, 2 timed out, 1 anything else.

use anyhow::{bail, Context};
use statewait::probe::{probe_fn, ProbeError, StateSample};
use statewait::{ConvergenceSpec, OperationContext, Outcome, Poller, PollerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Args {
    pending: Vec<String>,
    target: Vec<String>,
    sequence: Vec<String>,
    interval: Duration,
    timeout: Duration,
    fixed: bool,
}

fn print_usage() {
    println!(
        r#"statewait-sim - 状态收敛轮询演示

USAGE:
    statewait-sim --pending <LIST> --target <LIST> --sequence <LIST> [OPTIONS]

OPTIONS:
    --pending <A,B>         Statuses that mean "still in progress"
    --target <C>            Statuses that mean "converged"
    --sequence <A,A,C>      Statuses reported by successive probes (last repeats)
    --interval-ms <N>       Minimum poll interval (default 1000)
    --timeout-ms <N>        Operation budget (default 10000)
    --fixed                 Poll at a fixed interval instead of backing off
    help                    Show this help message

ENVIRONMENT:
    RUST_LOG                        Log filter (e.g. statewait=debug)
    STATEWAIT_MAX_POLL_INTERVAL_SECS
    STATEWAIT_BACKOFF_FACTOR"#
    );
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut parsed = Args {
        pending: Vec::new(),
        target: Vec::new(),
        sequence: Vec::new(),
        interval: Duration::from_millis(1000),
        timeout: Duration::from_millis(10_000),
        fixed: false,
    };

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let mut value = || {
            it.next()
                .cloned()
                .with_context(|| format!("{arg} requires a value"))
        };
        match arg.as_str() {
            "--pending" => parsed.pending = split_list(&value()?),
            "--target" => parsed.target = split_list(&value()?),
            "--sequence" => parsed.sequence = split_list(&value()?),
            "--interval-ms" => {
                let ms: u64 = value()?.parse().context("--interval-ms must be an integer")?;
                parsed.interval = Duration::from_millis(ms);
            }
            "--timeout-ms" => {
                let ms: u64 = value()?.parse().context("--timeout-ms must be an integer")?;
                parsed.timeout = Duration::from_millis(ms);
            }
            "--fixed" => parsed.fixed = true,
            other => bail!("unknown argument: {other}"),
        }
    }

    if parsed.sequence.is_empty() {
        bail!("--sequence must name at least one status");
    }
    Ok(parsed)
}

async fn simulate(args: Args) -> anyhow::Result<i32> {
    let root = CancellationToken::new();
    let ctx = OperationContext::with_timeout(&root, args.timeout);

    let shutdown = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let spec = ConvergenceSpec::builder("simulated resource")
        .pending(args.pending.iter().map(String::as_str))
        .target(args.target.iter().map(String::as_str))
        .min_poll_interval(args.interval)
        .deadline_from(&ctx)
        .build()?;

    let sequence = Arc::new(args.sequence);
    let cursor = Arc::new(AtomicUsize::new(0));
    let probe = probe_fn(move || {
        let sequence = sequence.clone();
        let cursor = cursor.clone();
        async move {
            let i = cursor.fetch_add(1, Ordering::SeqCst);
            let status = sequence
                .get(i)
                .or_else(|| sequence.last())
                .cloned()
                .ok_or_else(|| ProbeError::missing_state("empty sequence"))?;
            Ok::<_, ProbeError>(StateSample::new(i + 1, status))
        }
    });

    let config = if args.fixed {
        PollerConfig::from_env().with_backoff_factor(1.0)
    } else {
        PollerConfig::from_env()
    };

    let code = match Poller::new(config).run(&spec, &probe, ctx.cancellation()).await {
        Outcome::Converged(sample) => {
            println!(
                "converged: status={} after {} probe(s)",
                sample.status(),
                sample.value()
            );
            0
        }
        outcome @ Outcome::TimedOut { .. } => {
            if let Err(e) = outcome.into_result() {
                println!("{e}");
            }
            2
        }
        Outcome::Failed(e) => {
            println!("failed [{}]: {}", e.class(), e);
            1
        }
    };
    Ok(code)
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || matches!(args[0].as_str(), "help" | "--help" | "-h") {
        print_usage();
        std::process::exit(if args.is_empty() { 1 } else { 0 });
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = parse_args(&args)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let code = runtime.block_on(simulate(args))?;
    std::process::exit(code);
}
