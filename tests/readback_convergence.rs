//! Integration tests for demand/readback pairs
//!
//! Drive converging writes through the loopback transport and check that
//! rejected writes, lost acknowledgements and non-convergence are told apart.

use pvlink::config::PvConfig;
use pvlink::error::WaitStage;
use pvlink::io::{ChannelCache, LoopbackTransport, OpStatus, PutBehavior};
use pvlink::protocol::value::PvValue;
use pvlink::pv::{Convergence, PvFactory};
use pvlink::PvError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEMAND: &str = "BL:STAGE:Temperature";
const READBACK: &str = "BL:STAGE:Temperature_RBV";

fn setup(link_delay: Option<Duration>) -> (LoopbackTransport, PvFactory) {
    let transport = LoopbackTransport::new();
    transport.define(DEMAND, PvValue::Double(20.0));
    transport.define(READBACK, PvValue::Double(20.0));
    if let Some(delay) = link_delay {
        transport.link_readback(DEMAND, READBACK, delay);
    }
    let cache = Arc::new(ChannelCache::new(Arc::new(transport.clone())));
    let config = PvConfig::default().with_default_timeout(Duration::from_secs(2));
    let factory = PvFactory::new("BL:STAGE:", cache, config).unwrap();
    (transport, factory)
}

#[test]
fn test_put_blocks_until_readback_matches() {
    let (_transport, factory) = setup(Some(Duration::from_millis(100)));
    let temperature =
        factory.demand_readback::<f64>("Temperature", "Temperature_RBV", Convergence::WaitUntilEqual);

    let start = Instant::now();
    temperature.put(25.0).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(temperature.get().unwrap(), 25.0);
}

#[test]
fn test_put_then_get_within_tolerance() {
    let (transport, factory) = setup(None);
    let temperature = factory
        .demand_readback::<f64>(
            "Temperature",
            "Temperature_RBV",
            Convergence::WaitUntilEqualWithin(Duration::from_secs(1)),
        )
        .with_tolerance(1e-3);

    // The controller reports a slightly different value
    let writer = transport.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        writer.set_value(READBACK, PvValue::Double(30.0001));
    });

    temperature.put(30.0).unwrap();
    handle.join().unwrap();
    let readback = temperature.get().unwrap();
    assert!((readback - 30.0).abs() < 1e-3);
}

#[test]
fn test_readback_never_updates() {
    let (transport, factory) = setup(None);
    let temperature = factory.demand_readback::<f64>(
        "Temperature",
        "Temperature_RBV",
        Convergence::WaitUntilEqualWithin(Duration::from_millis(100)),
    );

    let err = temperature.put(50.0).unwrap_err();
    assert!(err.is_timeout_at(WaitStage::Convergence), "{}", err);
    // The demand write itself went through
    assert_eq!(transport.value(DEMAND), Some(PvValue::Double(50.0)));
    assert_eq!(transport.monitor_count(READBACK), 0);
}

#[test]
fn test_rejected_write_is_communication_error() {
    let (transport, factory) = setup(Some(Duration::ZERO));
    transport.set_put_behavior(DEMAND, PutBehavior::Fail("above HIGH limit".into()));
    let temperature = factory.with_rbv::<f64>("Temperature");

    let err = temperature.put(500.0).unwrap_err();
    assert!(matches!(err, PvError::Communication { .. }));
}

#[test]
fn test_unacknowledged_write_is_put_callback_timeout() {
    let (transport, factory) = setup(Some(Duration::ZERO));
    transport.set_put_behavior(DEMAND, PutBehavior::Hold);
    let temperature = factory.demand_readback::<f64>(
        "Temperature",
        "Temperature_RBV",
        Convergence::WaitUntilEqual,
    );

    let cache = factory.cache().clone();
    let short = PvFactory::new(
        "BL:STAGE:",
        cache,
        PvConfig::default().with_default_timeout(Duration::from_millis(50)),
    )
    .unwrap()
    .demand_readback::<f64>("Temperature", "Temperature_RBV", Convergence::WaitUntilEqual);

    let err = short.put(21.0).unwrap_err();
    assert!(err.is_timeout_at(WaitStage::PutCallback));

    transport.complete_pending(DEMAND, OpStatus::Normal);
    transport.set_put_behavior(DEMAND, PutBehavior::Immediate);
    temperature.put(22.0).unwrap();
}

#[test]
fn test_no_convergence_policy_returns_after_ack() {
    let (transport, factory) = setup(Some(Duration::from_secs(5)));
    let temperature = factory.with_rbv::<f64>("Temperature");
    assert_eq!(temperature.policy(), Convergence::None);

    let start = Instant::now();
    temperature.put(40.0).unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(transport.value(READBACK), Some(PvValue::Double(20.0)));
}

#[test]
fn test_integer_pair_exact() {
    let transport = LoopbackTransport::new();
    transport.define("BL:CAM:NumImages", PvValue::Int(1));
    transport.define("BL:CAM:NumImages_RBV", PvValue::Int(1));
    transport.link_readback("BL:CAM:NumImages", "BL:CAM:NumImages_RBV", Duration::from_millis(10));
    let cache = Arc::new(ChannelCache::new(Arc::new(transport)));
    let factory = PvFactory::new("BL:CAM:", cache, PvConfig::default()).unwrap();

    let images = factory.demand_readback::<i32>("NumImages", "NumImages_RBV", Convergence::WaitUntilEqual);
    images.put(100).unwrap();
    assert_eq!(images.get().unwrap(), 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_put_async() {
    let (_transport, factory) = setup(Some(Duration::from_millis(20)));
    let temperature =
        factory.demand_readback::<f64>("Temperature", "Temperature_RBV", Convergence::WaitUntilEqual);

    temperature.put_async(18.5).await.unwrap();
    assert_eq!(temperature.get().unwrap(), 18.5);
}
