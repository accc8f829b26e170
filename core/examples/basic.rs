//! Basic circuit breaker usage example
//!
//! Run with `RUST_LOG=tripwire=debug cargo run --example basic` to see the
//! breaker's own transition logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tripwire::CircuitBreaker;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    // A service that fails twice, then succeeds
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let unreliable_service = move |()| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if attempt <= 2 {
                Err("Service down")
            } else {
                Ok("OK")
            }
        }
    };

    let circuit = CircuitBreaker::builder("unreliable_service")
        .failure_threshold(2)
        .cooldown(Duration::from_millis(2000))
        .on_open(|name, cooldown| println!("🔴 Circuit '{}' opened for {:?}", name, cooldown))
        .on_half_open(|name| println!("🟡 Circuit '{}' half-open, testing...", name))
        .on_close(|name| println!("🟢 Circuit '{}' closed!", name))
        .build(unreliable_service)
        .expect("valid circuit configuration");

    println!("Initial state: {}\n", circuit.state());

    // First two calls fail and open the circuit; calls 3 and 4 are rejected
    for i in 1..=4 {
        match circuit.execute(()).await {
            Ok(result) => println!("Call {}: {} (state: {})", i, result, circuit.state()),
            Err(e) => println!("Call {}: {} (state: {})", i, e, circuit.state()),
        }
    }
    println!(
        "\nService was invoked {} times\n",
        attempts.load(Ordering::SeqCst)
    );

    println!("--- Waiting for cooldown ---");
    tokio::time::sleep(Duration::from_millis(2000)).await;

    match circuit.execute(()).await {
        Ok(result) => println!("Call 5: {} (state: {})", result, circuit.state()),
        Err(e) => println!("Call 5: {} (state: {})", e, circuit.state()),
    }
    println!("Failure count: {}", circuit.failure_count());
    println!("Stats: {:?}", circuit.stats());
}
