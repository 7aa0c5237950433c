//! Hydration Race Example
//!
//! This example shows how an atom buffers updates that arrive while a slow
//! deserialization of the stored state is still running, and replays them on
//! the hydrated value once it lands.
//!
//! Run with: cargo run --example hydration_race

use quark_atom::{Atom, AtomError, MemoryStore, PersistConfig, Transform};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), AtomError> {
    println!("=== Hydration Race Example ===\n");

    // A previous session left a shopping list behind
    let store = Arc::new(MemoryStore::new().with_entry(
        "shopping",
        r#"{"data":["milk","bread"],"version":"1"}"#,
    ));

    // Decoding takes 200ms, so the atom starts out hydrating
    let list = Atom::builder(Vec::<String>::new())
        .sync_reducer(|mut items, item: String| {
            items.push(item);
            Ok(items)
        })
        .persist(PersistConfig::new("shopping"), store.clone())
        .deserialize(|data| {
            Transform::deferred(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                serde_json::from_value(data).map_err(|e| AtomError::deserialize(e.to_string()))
            })
        })
        .build()
        .await;

    let _sub = list.subscribe(|items| println!("  state: {:?}", items));

    // === Phase 1: updates during hydration ===
    println!("\n=== Phase 1: Hydrating ({}) ===\n", list.is_hydrating());
    for item in ["eggs", "coffee"] {
        let outcome = list.update(item.to_string()).await?;
        println!("  update {:>8} -> {:?}", item, outcome);
    }
    println!("  store writes so far: {}", store.write_count());

    // === Phase 2: hydration lands, buffer replays ===
    list.hydrated().await;
    list.flush().await;
    println!("\n=== Phase 2: Hydrated ===\n");
    println!("  final: {:?}", list.value());
    println!("  stored: {}", store.raw("shopping").unwrap_or_default());

    Ok(())
}
