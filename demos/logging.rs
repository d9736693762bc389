//! Demonstration of logging capabilities using the tracing crate
//!
//! This example shows how to enable and configure logging for attribute
//! reads, writes and value waits.
//!
//! # Running with different log levels
//!
//! ```bash
//! # Show all logs, including every monitor delivery
//! RUST_LOG=trace cargo run --example logging
//!
//! # Show only info and above
//! RUST_LOG=info cargo run --example logging
//!
//! # Show debug logs only for pvlink
//! RUST_LOG=pvlink=debug cargo run --example logging
//!
//! # Show trace logs for the io module only
//! RUST_LOG=pvlink::io=trace cargo run --example logging
//! ```

use pvlink::config::PvConfig;
use pvlink::io::{ChannelCache, LoopbackTransport, PutBehavior};
use pvlink::protocol::value::PvValue;
use pvlink::pv::{Convergence, PvFactory};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls the filter; default to debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("=== pvlink Logging Demo ===");

    let transport = LoopbackTransport::new();
    transport.define("BL:STAGE:X", PvValue::Double(0.0));
    transport.define("BL:STAGE:X_RBV", PvValue::Double(0.0));
    transport.define("BL:STAGE:Counter", PvValue::Int(0));
    transport.link_readback("BL:STAGE:X", "BL:STAGE:X_RBV", Duration::from_millis(50));

    let cache = Arc::new(ChannelCache::new(Arc::new(transport.clone())));
    let factory = PvFactory::new("BL:STAGE:", cache, PvConfig::default())?;

    // Demand write that waits for the readback; logs the put and the wait
    let x = factory.demand_readback::<f64>("X", "X_RBV", Convergence::WaitUntilEqual);
    x.put(12.5)?;
    info!(readback = x.get()?, "Stage in position");

    // Value wait fed by another thread
    let counter = factory.read_only::<i32>("Counter");
    let producer = {
        let transport = transport.clone();
        thread::spawn(move || {
            for n in 1..=5 {
                thread::sleep(Duration::from_millis(10));
                transport.set_value("BL:STAGE:Counter", PvValue::Int(n));
            }
        })
    };
    let reached = counter.wait_for_value(|n| *n >= 5, Duration::from_secs(2))?;
    info!(counter = reached, "Counter reached target");
    if producer.join().is_err() {
        warn!("Producer thread panicked");
    }

    // A rejected write shows up as a communication error
    transport.set_put_behavior("BL:STAGE:X", PutBehavior::Fail("soft limit".into()));
    if let Err(e) = x.put(999.0) {
        warn!(error = %e, "Write rejected as expected");
    }

    info!("=== Demo completed successfully ===");
    info!("Try running with different RUST_LOG values to see different log levels:");
    info!("  RUST_LOG=trace cargo run --example logging    # All logs");
    info!("  RUST_LOG=info cargo run --example logging     # Info and above");

    Ok(())
}
