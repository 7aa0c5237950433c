//! # Quark Counter
//!
//! A standalone CLI counter built on Quark atoms. The counter is persisted to
//! a directory of JSON records and hydrated on every run, so each invocation
//! picks up where the last one left off.
//!
//! ## Record layout
//!
//! ```text
//! <dir>/<key>.json  →  { "data": { "value": n, "changes": c }, "version": "1" }
//! ```
//!
//! `--slow-load-ms` defers decoding of the stored record, which opens a
//! hydration window: updates submitted inside it are buffered and replayed on
//! the hydrated value.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use quark_atom::{
    Atom, AtomError, ConcurrencyPolicy, FileStore, PersistConfig, Transform, UpdateOutcome,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "quark-counter")]
#[command(about = "Persistent counter driven by a Quark atom")]
#[command(version)]
struct Cli {
    /// Directory holding persisted records
    #[arg(long, default_value = ".quark")]
    dir: PathBuf,

    /// Record key inside the directory
    #[arg(long, default_value = "counter")]
    key: String,

    /// Update concurrency policy: queue, throttle or debounce
    #[arg(long, default_value = "queue")]
    policy: ConcurrencyPolicy,

    /// Throttle/debounce window in milliseconds (unbounded if omitted)
    #[arg(long)]
    window_ms: Option<u64>,

    /// Delay decoding of the stored record to exercise the hydration buffer
    #[arg(long)]
    slow_load_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the persisted counter
    Show,
    /// Add N to the counter
    Inc { n: i64 },
    /// Subtract N from the counter
    Dec { n: i64 },
    /// Set the counter back to zero
    Reset,
    /// Fire N concurrent +1 updates whose reducers finish in reverse order
    Burst { n: u32 },
}

// ─── Counter state ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: i64,
    changes: u64,
}

#[derive(Clone, Copy, Debug)]
enum Action {
    Add { amount: i64, latency_ms: u64 },
    Reset,
}

impl Action {
    fn add(amount: i64) -> Self {
        Action::Add {
            amount,
            latency_ms: 0,
        }
    }
}

async fn apply(counter: Counter, action: Action) -> Result<Counter, AtomError> {
    match action {
        Action::Add { amount, latency_ms } => {
            if latency_ms > 0 {
                tokio::time::sleep(Duration::from_millis(latency_ms)).await;
            }
            let value = counter
                .value
                .checked_add(amount)
                .ok_or_else(|| AtomError::reducer("counter overflow"))?;
            Ok(Counter {
                value,
                changes: counter.changes + 1,
            })
        }
        Action::Reset => Ok(Counter {
            value: 0,
            changes: counter.changes + 1,
        }),
    }
}

async fn open(cli: &Cli) -> Atom<Counter, Action> {
    let store = Arc::new(FileStore::new(&cli.dir));
    let mut builder = Atom::builder(Counter::default())
        .reducer(apply)
        .concurrency(cli.policy)
        .persist(PersistConfig::new(cli.key.clone()), store);

    if let Some(ms) = cli.window_ms {
        builder = builder.window(Duration::from_millis(ms));
    }
    if let Some(delay) = cli.slow_load_ms {
        builder = builder.deserialize(move |data| {
            Transform::deferred(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                serde_json::from_value(data).map_err(|e| AtomError::deserialize(e.to_string()))
            })
        });
    }

    builder.build().await
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_counter(label: &str, counter: &Counter) {
    let border = "─".repeat(44);
    println!("  ┌{}┐", border);
    println!("  │ {:^42} │", label.bright_yellow().to_string());
    println!("  ├{}┤", border);
    println!("  │ {:<42} │", format!("value   = {}", counter.value));
    println!("  │ {:<42} │", format!("changes = {}", counter.changes));
    println!("  └{}┘", border);
}

fn outcome_label(outcome: &Result<UpdateOutcome, AtomError>) -> ColoredString {
    match outcome {
        Ok(UpdateOutcome::Committed) => "committed".bright_green(),
        Ok(UpdateOutcome::Skipped) => "skipped".bright_yellow(),
        Ok(UpdateOutcome::Throttled) => "throttled".bright_yellow(),
        Ok(UpdateOutcome::Buffered) => "buffered".bright_blue(),
        Err(e) => format!("failed: {}", e).bright_red(),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────

async fn run_update(atom: &Atom<Counter, Action>, action: Action) -> Result<(), AtomError> {
    let before = atom.value();
    let outcome = atom.update(action).await;
    step(&format!("{:?} → {}", action, outcome_label(&outcome)));
    outcome?;

    atom.hydrated().await;
    atom.flush().await;
    show_counter("before", &before);
    show_counter("after", &atom.value());
    Ok(())
}

async fn run_burst(atom: &Atom<Counter, Action>, n: u32) -> Result<(), AtomError> {
    header(&format!("BURST: {} concurrent +1 updates ({})", n, atom.config().concurrency));

    let handles: Vec<_> = (0..n)
        .map(|i| {
            atom.update(Action::Add {
                amount: 1,
                latency_ms: u64::from((n - i) * 10),
            })
        })
        .collect();

    let mut committed = 0;
    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.await;
        if matches!(outcome, Ok(UpdateOutcome::Committed)) {
            committed += 1;
        }
        step(&format!("update #{:<3} {}", i + 1, outcome_label(&outcome)));
    }

    atom.hydrated().await;
    atom.flush().await;
    step(&format!("{} of {} updates committed", committed, n));
    show_counter("after burst", &atom.value());
    Ok(())
}

async fn run(cli: Cli) -> Result<(), AtomError> {
    let atom = open(&cli).await;
    if atom.is_hydrating() {
        step("hydration in flight; updates will be buffered");
    }

    match cli.command {
        Commands::Show => {
            atom.hydrated().await;
            header(&format!("COUNTER: {}", cli.dir.join(format!("{}.json", cli.key)).display()));
            show_counter(&cli.key, &atom.value());
            Ok(())
        }
        Commands::Inc { n } => run_update(&atom, Action::add(n)).await,
        Commands::Dec { n } => {
            let amount = n
                .checked_neg()
                .ok_or_else(|| AtomError::InvalidConfig(format!("cannot negate {}", n)))?;
            run_update(&atom, Action::add(amount)).await
        }
        Commands::Reset => run_update(&atom, Action::Reset).await,
        Commands::Burst { n } => run_burst(&atom, n).await,
    }
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("  {} {}", "✗".bright_red().bold(), e.to_string().bright_red());
        std::process::exit(1);
    }
}
