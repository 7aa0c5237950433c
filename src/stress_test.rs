use async_stream::stream;
use futures::stream::Stream;
use futures::stream::StreamExt;
use quark_atom::{
    Atom, AtomError, ConcurrencyPolicy, MemoryStore, PersistConfig, Transform, UpdateOutcome,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub policy: ConcurrencyPolicy,
    pub num_writers: usize,
    pub updates_per_writer: usize,
    pub committed: usize,
    pub skipped: usize,
    pub throttled: usize,
    pub buffered: usize,
    pub failed: usize,
    pub consistent: bool,
    pub total_time: Duration,
    pub avg_update_time: Duration,
    pub updates_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Policy:                    {:>38} ║", self.policy);
        println!("║  Number of Writers:         {:>38} ║", self.num_writers);
        println!("║  Updates per Writer:        {:>38} ║", self.updates_per_writer);
        println!("║  Committed:                 {:>38} ║", self.committed);
        println!("║  Skipped:                   {:>38} ║", self.skipped);
        println!("║  Throttled:                 {:>38} ║", self.throttled);
        println!("║  Buffered:                  {:>38} ║", self.buffered);
        println!("║  Failed:                    {:>38} ║", self.failed);
        println!("║  Final State Consistent:    {:>38} ║", if self.consistent { "yes" } else { "NO" });
        println!("║  Total Time:                {:>39}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Update Time:       {:>36}µs ║", self.avg_update_time.as_micros());
        println!("║  Updates/Second:            {:>38.0} ║", self.updates_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }

    fn record(&mut self, outcome: &Result<UpdateOutcome, AtomError>) {
        match outcome {
            Ok(UpdateOutcome::Committed) => self.committed += 1,
            Ok(UpdateOutcome::Skipped) => self.skipped += 1,
            Ok(UpdateOutcome::Throttled) => self.throttled += 1,
            Ok(UpdateOutcome::Buffered) => self.buffered += 1,
            Err(e) => {
                tracing::warn!(error = %e, "update failed");
                self.failed += 1;
            }
        }
    }
}

/// One submitted update: which writer sent it, how long its reducer sleeps,
/// and the delta it applies.
#[derive(Clone, Copy, Debug)]
pub struct Delta {
    pub writer: usize,
    pub delay_us: u64,
    pub amount: i64,
}

/// Running totals kept by the stress atom.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tally {
    pub total: i64,
    pub applied: usize,
    pub per_writer: Vec<usize>,
}

/// Generator that yields updates with random reducer latencies
fn update_generator(writer: usize, num_updates: usize, max_delay_us: u64) -> impl Stream<Item = Delta> {
    stream! {
        let mut rng = StdRng::from_entropy();
        for _ in 0..num_updates {
            yield Delta {
                writer,
                delay_us: rng.gen_range(0..=max_delay_us),
                amount: rng.gen_range(-100..=100),
            };
        }
    }
}

async fn tally_atom(policy: ConcurrencyPolicy, num_writers: usize) -> Atom<Tally, Delta> {
    let initial = Tally {
        per_writer: vec![0; num_writers],
        ..Tally::default()
    };
    Atom::builder(initial)
        .reducer(|mut tally: Tally, delta: Delta| async move {
            if delta.delay_us > 0 {
                tokio::time::sleep(Duration::from_micros(delta.delay_us)).await;
            }
            tally.total += delta.amount;
            tally.applied += 1;
            if let Some(count) = tally.per_writer.get_mut(delta.writer) {
                *count += 1;
            }
            Ok(tally)
        })
        .concurrency(policy)
        .build()
        .await
}

/// Stress test for one concurrency policy with concurrent writers
pub async fn stress_test_policy(
    policy: ConcurrencyPolicy,
    num_writers: usize,
    updates_per_writer: usize,
    max_delay_us: u64,
) -> StressTestStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Atom Stress Test ({:<8})                          ║", policy.to_string());
    println!("║  Writers: {} | Updates/Writer: {} | Max Delay: {}µs ║",
             num_writers, updates_per_writer, max_delay_us);
    println!("╚════════════════════════════════════════════════════════════╝");

    let atom = tally_atom(policy, num_writers).await;
    let start = Instant::now();

    println!("\n[Phase 1/2] Submitting updates from concurrent writers...");

    // Phase 1: each writer submits its stream of updates and awaits the handles
    let mut handles = vec![];
    for writer in 0..num_writers {
        let atom = atom.clone();
        let handle = tokio::spawn(async move {
            let mut submitted = vec![];
            let mut updates = Box::pin(update_generator(writer, updates_per_writer, max_delay_us));
            while let Some(delta) = updates.next().await {
                submitted.push((delta.amount, Instant::now(), atom.update(delta)));
                if submitted.len() % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }

            let mut results = Vec::with_capacity(submitted.len());
            for (amount, at, handle) in submitted {
                let outcome = handle.await;
                results.push((amount, at.elapsed(), outcome));
            }
            results
        });
        handles.push(handle);
    }

    let mut stats = StressTestStats {
        policy,
        num_writers,
        updates_per_writer,
        committed: 0,
        skipped: 0,
        throttled: 0,
        buffered: 0,
        failed: 0,
        consistent: true,
        total_time: Duration::ZERO,
        avg_update_time: Duration::ZERO,
        updates_per_second: 0.0,
    };
    let mut update_times = vec![];
    let mut committed_total = 0i64;

    for handle in handles {
        match handle.await {
            Ok(results) => {
                for (amount, elapsed, outcome) in results {
                    if matches!(outcome, Ok(UpdateOutcome::Committed)) {
                        committed_total += amount;
                    }
                    stats.record(&outcome);
                    update_times.push(elapsed);
                }
            }
            Err(e) => tracing::error!(error = %e, "writer task failed"),
        }
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Verifying final state...");

    // Phase 2: the final state must account for exactly the committed updates
    let tally = atom.value();
    stats.total_time = start.elapsed();
    stats.consistent = tally.applied >= stats.committed
        && (policy != ConcurrencyPolicy::Queue
            || (tally.applied == stats.committed && tally.total == committed_total));

    if !stats.consistent {
        tracing::error!(?tally, committed = stats.committed, "final state does not match commits");
    }

    stats.avg_update_time = if !update_times.is_empty() {
        update_times.iter().sum::<Duration>() / update_times.len() as u32
    } else {
        Duration::ZERO
    };
    let total_updates = num_writers * updates_per_writer;
    stats.updates_per_second = total_updates as f64 / stats.total_time.as_secs_f64();

    println!("[Phase 2/2] ✓ Completed");
    stats
}

/// Stress test for updates racing an asynchronous hydration
pub async fn stress_test_hydration(num_writers: usize, updates_per_writer: usize) -> StressTestStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Hydration Race Stress Test                          ║");
    println!("║  Writers: {} | Updates/Writer: {}                          ║",
             num_writers, updates_per_writer);
    println!("╚════════════════════════════════════════════════════════════╝");

    let store = Arc::new(MemoryStore::new().with_entry(
        "stress-total",
        "{\"data\":1000,\"version\":\"1\"}",
    ));
    let atom = Atom::builder(0i64)
        .sync_reducer(|total, amount: i64| Ok(total + amount))
        .persist(PersistConfig::new("stress-total"), store.clone())
        .deserialize(|data| {
            Transform::deferred(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                serde_json::from_value(data).map_err(|e| AtomError::deserialize(e.to_string()))
            })
        })
        .build()
        .await;

    let start = Instant::now();
    println!("\n[Phase 1/2] Submitting updates during hydration...");

    let mut handles = vec![];
    for writer in 0..num_writers {
        let atom = atom.clone();
        handles.push(tokio::spawn(async move {
            let mut results = vec![];
            let mut updates = Box::pin(update_generator(writer, updates_per_writer, 0));
            while let Some(delta) = updates.next().await {
                let at = Instant::now();
                let outcome = atom.update(delta.amount).await;
                results.push((delta.amount, at.elapsed(), outcome));
            }
            results
        }));
    }

    let mut stats = StressTestStats {
        policy: ConcurrencyPolicy::Queue,
        num_writers,
        updates_per_writer,
        committed: 0,
        skipped: 0,
        throttled: 0,
        buffered: 0,
        failed: 0,
        consistent: true,
        total_time: Duration::ZERO,
        avg_update_time: Duration::ZERO,
        updates_per_second: 0.0,
    };
    let mut update_times = vec![];
    let mut expected = 1000i64;

    for handle in handles {
        if let Ok(results) = handle.await {
            for (amount, elapsed, outcome) in results {
                if outcome.is_ok() {
                    expected += amount;
                }
                stats.record(&outcome);
                update_times.push(elapsed);
            }
        }
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Waiting for hydration and write-back...");

    atom.hydrated().await;
    atom.flush().await;
    stats.total_time = start.elapsed();

    let persisted = store
        .raw("stress-total")
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|record| record.get("data").and_then(|data| data.as_i64()));
    stats.consistent = atom.value() == expected && persisted.map_or(true, |p| p == expected);

    if !stats.consistent {
        tracing::error!(value = atom.value(), expected, ?persisted, "hydration replay lost updates");
    }

    stats.avg_update_time = if !update_times.is_empty() {
        update_times.iter().sum::<Duration>() / update_times.len() as u32
    } else {
        Duration::ZERO
    };
    stats.updates_per_second = (num_writers * updates_per_writer) as f64 / stats.total_time.as_secs_f64();

    println!("[Phase 2/2] ✓ Completed");
    stats
}

/// Queue-mode scaling analysis over an increasing number of writers
pub async fn stress_test_scaling(max_writers: usize, step_size: usize) {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Queue Throughput vs Writers        ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut current_writers = step_size;
    while current_writers <= max_writers {
        let stats = stress_test_policy(ConcurrencyPolicy::Queue, current_writers, 50, 200).await;
        stats.print();
        current_writers += step_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_stress_is_consistent() {
        let stats = stress_test_policy(ConcurrencyPolicy::Queue, 4, 25, 50).await;
        assert!(stats.consistent);
        assert_eq!(stats.committed, 100);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_throttle_stress_drops_some() {
        let stats = stress_test_policy(ConcurrencyPolicy::Throttle, 4, 25, 50).await;
        assert!(stats.consistent);
        assert_eq!(stats.committed + stats.throttled, 100);
    }

    #[tokio::test]
    async fn test_debounce_stress_commits_at_least_one() {
        let stats = stress_test_policy(ConcurrencyPolicy::Debounce, 4, 25, 50).await;
        assert!(stats.consistent);
        assert!(stats.committed >= 1);
        assert_eq!(stats.committed + stats.skipped, 100);
    }

    #[tokio::test]
    async fn test_hydration_stress_loses_nothing() {
        let stats = stress_test_hydration(3, 20).await;
        assert!(stats.consistent);
        assert_eq!(stats.failed, 0);
    }
}
