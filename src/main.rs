use quark_atom::{Atom, ConcurrencyPolicy, UpdateOutcome};
use quark_stream::Observable;
use std::time::Duration;
use stress_test::{stress_test_hydration, stress_test_policy, stress_test_scaling};
use tracing_subscriber::EnvFilter;
pub mod stress_test;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    rt.block_on(async_main());
}

/// Submit three appends whose reducers finish in reverse order and print
/// what each policy commits.
async fn run_scenario(policy: ConcurrencyPolicy) {
    let atom = Atom::builder(Vec::<u32>::new())
        .reducer(|mut list: Vec<u32>, (delay_ms, value): (u64, u32)| async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            list.push(value);
            Ok(list)
        })
        .concurrency(policy)
        .build()
        .await;

    let _sub = atom
        .state()
        .subscribe(move |list| println!("  [{}] commit -> {:?}", policy, list));

    let handles = [(120, 1), (60, 2), (1, 3)].map(|op| atom.update(op));
    let outcomes: Vec<UpdateOutcome> = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter_map(Result::ok)
        .collect();

    println!("  [{}] outcomes: {:?}", policy, outcomes);
    println!("  [{}] final:    {:?}", policy, atom.value());
}

async fn async_main() {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            POLICY SCENARIOS                                ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    for policy in [
        ConcurrencyPolicy::Queue,
        ConcurrencyPolicy::Throttle,
        ConcurrencyPolicy::Debounce,
    ] {
        println!("\n{} (latencies 120ms, 60ms, 1ms):", policy);
        run_scenario(policy).await;
    }

    // Run async stress tests
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: queue with small scale
    let stats = stress_test_policy(ConcurrencyPolicy::Queue, 4, 100, 200).await;
    stats.print();

    // Test 2: throttle with small scale
    let stats = stress_test_policy(ConcurrencyPolicy::Throttle, 4, 100, 200).await;
    stats.print();

    // Test 3: debounce with small scale
    let stats = stress_test_policy(ConcurrencyPolicy::Debounce, 4, 100, 200).await;
    stats.print();

    // Test 4: queue with medium scale
    let stats = stress_test_policy(ConcurrencyPolicy::Queue, 10, 500, 50).await;
    stats.print();

    // Test 5: updates racing hydration
    let stats = stress_test_hydration(8, 50).await;
    stats.print();

    // Test 6: Scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (Queue)                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(20, 4).await;

    println!("\n✓ All stress tests completed successfully!");
}
