//! Derived Streams Example
//!
//! This example demonstrates the stream layer on its own: equality-gated
//! broadcast, replay on subscribe, and piped children that only emit when
//! their projection changes.
//!
//! Run with: cargo run --example derived_streams

use quark_stream::{BehaviorSubject, Observable, Piped, Subject};

#[derive(Clone, Debug, PartialEq)]
struct Profile {
    name: String,
    visits: u32,
}

fn main() {
    println!("=== Derived Streams Example ===\n");

    // === Plain subject: de-duplicated fan-out ===
    println!("=== Subject ===\n");
    let clicks: Subject<u32> = Subject::new();
    let sub = clicks.subscribe(|n| println!("  click #{}", n));
    for n in [1, 1, 2, 2, 3] {
        clicks.next(n);
    }
    sub.unsubscribe();
    clicks.next(4);
    println!("  (4 was emitted after unsubscribe)");

    // === Behavior subject with a piped projection ===
    println!("\n=== BehaviorSubject + pipe ===\n");
    let profile = BehaviorSubject::new(Profile {
        name: "ada".to_string(),
        visits: 0,
    });

    // Only emits when the name changes, not on every visit
    let name = profile.pipe(|p: &Profile, _prev: Option<&Profile>| Piped::Emit(p.name.clone()));
    let _name_sub = name.subscribe(|n| println!("  name -> {}", n));

    // Emits only on every tenth visit
    let milestones = profile.pipe(|p: &Profile, _prev: Option<&Profile>| {
        if p.visits > 0 && p.visits % 10 == 0 {
            Piped::Emit(p.visits)
        } else {
            Piped::Stop
        }
    });
    let _milestone_sub = milestones.subscribe(|v| println!("  milestone: {} visits", v));

    for visits in 1..=20 {
        profile.next(Profile {
            name: "ada".to_string(),
            visits,
        });
    }
    profile.next(Profile {
        name: "grace".to_string(),
        visits: 20,
    });

    println!("\n  current profile: {:?}", profile.value());
    println!("  derived name:    {:?}", name.value());
}
