use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use faultline_core::logging::init_tracing;
use faultline_core::{
    CancelReason, FaultlineConfig, Logger, Observer, ScopeFlags, ScopeManager, Severity,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Serialize)]
struct StressReport {
    writers: usize,
    capacity: usize,
    retained: usize,
    severe: usize,
    ok: bool,
    elapsed_ms: u128,
}

#[derive(Debug, Default, Serialize)]
struct ScopeReport {
    opened: usize,
    cancelled: usize,
    deadline_exceeded: usize,
    still_open: usize,
    reaped: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Command::new("faultline")
        .version(faultline_core::VERSION)
        .about("Error history, health advice and scope cancellation")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML configuration file"),
        )
        .subcommand(
            Command::new("stress")
                .about("Hammer the error history with concurrent writers")
                .arg(
                    Arg::new("writers")
                        .long("writers")
                        .default_value("64")
                        .value_parser(value_parser!(usize))
                        .help("Number of concurrent writers"),
                )
                .arg(
                    Arg::new("capacity")
                        .long("capacity")
                        .value_parser(value_parser!(usize))
                        .help("History capacity (defaults to the configured one)"),
                )
                .arg(
                    Arg::new("severe-ratio")
                        .long("severe-ratio")
                        .default_value("0.5")
                        .value_parser(value_parser!(f64))
                        .help("Share of writers reporting Critical or worse"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("scopes")
                .about("Open scopes, cancel half and let the rest time out")
                .arg(
                    Arg::new("count")
                        .long("count")
                        .default_value("100")
                        .value_parser(value_parser!(usize))
                        .help("Number of scopes to open"),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .default_value("50")
                        .value_parser(value_parser!(u64))
                        .help("Scope timeout in milliseconds"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => FaultlineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let mut config = FaultlineConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            config
        }
    };

    match matches.subcommand() {
        Some(("stress", args)) => {
            let writers = arg::<usize>(args, "writers")?;
            let capacity = args
                .get_one::<usize>("capacity")
                .copied()
                .unwrap_or(config.history.capacity);
            let ratio = arg::<f64>(args, "severe-ratio")?.clamp(0.0, 1.0);

            let report = run_stress(config.with_capacity(capacity), writers, ratio).await?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Stress Report:");
                println!("  Writers: {}", report.writers);
                println!("  Capacity: {}", report.capacity);
                println!("  Retained: {}", report.retained);
                println!("  Severe: {}", report.severe);
                println!("  Verdict: {}", if report.ok { "OK" } else { "NOT OK" });
                println!("  Elapsed: {}ms", report.elapsed_ms);
            }
        }
        Some(("scopes", args)) => {
            let count = arg::<usize>(args, "count")?;
            let timeout = Duration::from_millis(arg::<u64>(args, "timeout-ms")?);

            let report = run_scopes(&config, count, timeout).await;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Scope Report:");
                println!("  Opened: {}", report.opened);
                println!("  Cancelled: {}", report.cancelled);
                println!("  Deadline exceeded: {}", report.deadline_exceeded);
                println!("  Still open: {}", report.still_open);
                println!("  Reaped: {}", report.reaped);
            }
        }
        _ => {
            println!("faultline {}", faultline_core::VERSION);
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn arg<T>(args: &ArgMatches, name: &str) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

async fn run_stress(config: FaultlineConfig, writers: usize, ratio: f64) -> Result<StressReport> {
    let capacity = config.history.capacity;
    // No per-event log lines.
    let observer = Arc::new(Observer::from_config(&config).with_logger(Logger::new()));
    let severe_writers = (writers as f64 * ratio).round() as usize;

    let started = Instant::now();
    let tasks: Vec<_> = (0..writers)
        .map(|i| {
            let observer = Arc::clone(&observer);
            let severity = if i < severe_writers {
                Severity::Critical
            } else {
                Severity::Warning
            };
            tokio::spawn(async move {
                observer.report(severity, Some(format!("writer {i} failed")));
            })
        })
        .collect();

    for task in tasks {
        task.await.context("writer task failed")?;
    }

    let snapshot = observer.collector().snapshot();
    Ok(StressReport {
        writers,
        capacity,
        retained: snapshot.len(),
        severe: snapshot.severe_count(),
        ok: observer.ok(),
        elapsed_ms: started.elapsed().as_millis(),
    })
}

async fn run_scopes(config: &FaultlineConfig, count: usize, timeout: Duration) -> ScopeReport {
    let manager = ScopeManager::new(config.scopes.with_timeout(timeout));
    let flags = ScopeFlags::default().cancellable().with_timeout();

    let scopes: Vec<_> = (0..count)
        .filter_map(|_| manager.get(manager.set(flags)))
        .collect();

    for scope in scopes.iter().step_by(2) {
        manager.cancel(scope.id());
    }

    tokio::time::sleep(timeout + Duration::from_millis(10)).await;

    let mut report = ScopeReport {
        opened: scopes.len(),
        still_open: manager.len(),
        ..ScopeReport::default()
    };
    for scope in &scopes {
        match scope.context().reason() {
            Some(CancelReason::Cancelled) => report.cancelled += 1,
            Some(CancelReason::DeadlineExceeded) => report.deadline_exceeded += 1,
            None => {}
        }
    }
    report.reaped = manager.reap_expired();
    report
}
