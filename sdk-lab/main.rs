//! Toggles Rust client lab
//!
//! Manual verification against a running flag service.
//! Run with: cargo run --example sdk-lab
//!
//! Reads `TOGGLES_CLIENT_ID`, `TOGGLES_CLIENT_SECRET`, and optionally
//! `TOGGLES_BASE_URL`, `TOGGLES_STAGE` and `TOGGLES_LAB_FEATURE`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toggles::{EventKind, FnSubscriber, TogglesClient, TogglesConfig};

const PASS: &str = "\x1b[32m[PASS]\x1b[0m";
const FAIL: &str = "\x1b[31m[FAIL]\x1b[0m";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toggles=debug".into()),
        )
        .init();

    println!("=== Toggles Rust Client Lab ===\n");

    let mut passed = 0;
    let mut failed = 0;

    macro_rules! pass {
        ($test:expr) => {{
            println!("{} {}", PASS, $test);
            passed += 1;
        }};
    }

    macro_rules! fail {
        ($test:expr) => {{
            println!("{} {}", FAIL, $test);
            failed += 1;
        }};
    }

    let (client_id, client_secret) = match (
        std::env::var("TOGGLES_CLIENT_ID"),
        std::env::var("TOGGLES_CLIENT_SECRET"),
    ) {
        (Ok(id), Ok(secret)) => (id, secret),
        _ => {
            println!("TOGGLES_CLIENT_ID and TOGGLES_CLIENT_SECRET must be set");
            std::process::exit(2);
        }
    };

    let mut builder = TogglesConfig::builder(client_id, client_secret)
        .cache_ttl(Duration::from_secs(2))
        .event_poll_interval(Duration::from_millis(100));
    if let Ok(url) = std::env::var("TOGGLES_BASE_URL") {
        builder = builder.base_url(url);
    }
    if let Ok(stage) = std::env::var("TOGGLES_STAGE") {
        builder = builder.stage(stage);
    }
    let feature = std::env::var("TOGGLES_LAB_FEATURE").unwrap_or_else(|_| "dark-mode".to_string());

    // Test 1: Construction
    println!("Testing initialization...");
    let client = match TogglesClient::new(builder.build()) {
        Ok(c) => {
            pass!(format!("new() - {}", c.version()));
            c
        }
        Err(e) => {
            fail!(format!("new() - {}", e));
            print_summary(passed, failed);
            std::process::exit(1);
        }
    };

    let fetched = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fetched);
    client.subscribe(Arc::new(FnSubscriber::new([EventKind::Fetched], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })));

    // Test 2: Startup fetch
    match tokio::time::timeout(Duration::from_secs(10), client.initialize()).await {
        Ok(Ok(())) => pass!("initialize()"),
        Ok(Err(e)) => fail!(format!("initialize() - {}", e)),
        Err(_) => fail!("initialize() - timed out"),
    }

    // Test 3: Snapshot
    println!("\nTesting evaluation...");
    match client.snapshot().await {
        Some(snapshot) => pass!(format!("snapshot() - {} features", snapshot.len())),
        None => fail!("snapshot() - none available"),
    }

    // Test 4: Known feature
    match client.evaluate(&feature).await {
        Some(enabled) => pass!(format!("evaluate({}) = {}", feature, enabled)),
        None => fail!(format!("evaluate({}) - feature unknown", feature)),
    }

    // Test 5: Default for unknown feature
    let unknown = "toggles-lab-does-not-exist";
    if client.is_enabled(unknown, true).await && !client.is_enabled(unknown, false).await {
        pass!("Default value for unknown feature");
    } else {
        fail!("Default value for unknown feature - default not honoured");
    }

    // Test 6: Refresh after TTL
    println!("\nTesting refresh...");
    tokio::time::sleep(Duration::from_millis(2500)).await;
    client.is_enabled(&feature, false).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let fetches = fetched.load(Ordering::SeqCst);
    if fetches >= 2 {
        pass!(format!("Refresh after TTL ({} fetches)", fetches));
    } else {
        fail!(format!("Refresh after TTL - expected 2 fetches, saw {}", fetches));
    }

    // Test 7: Metrics
    let metrics = client.flush_metrics();
    let evaluations: u64 = metrics.values().map(|m| m.evaluations).sum();
    if evaluations >= 3 {
        pass!(format!("flush_metrics() - {} evaluations", evaluations));
    } else {
        fail!(format!("flush_metrics() - expected 3 evaluations, got {}", evaluations));
    }

    // Test 8: Cleanup
    println!("\nTesting cleanup...");
    client.close().await;
    pass!("close()");

    print_summary(passed, failed);

    if failed > 0 {
        println!("\n\x1b[31mSome verifications failed!\x1b[0m");
        std::process::exit(1);
    } else {
        println!("\n\x1b[32mAll verifications passed!\x1b[0m");
        std::process::exit(0);
    }
}

fn print_summary(passed: i32, failed: i32) {
    println!("\n{}", "=".repeat(40));
    println!("Results: {} passed, {} failed", passed, failed);
    println!("{}", "=".repeat(40));
}
