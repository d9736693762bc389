//! Integration tests for write-triggered actions
//!
//! A client starts an acquisition, the transport's completion callback feeds
//! the status machine, and separate threads wait for the action to finish.

use pvlink::config::{ActionProtocol, DeviceConfig, PvConfig};
use pvlink::error::WaitStage;
use pvlink::io::{ChannelCache, LoopbackTransport, OpStatus, PutBehavior};
use pvlink::protocol::value::PvValue;
use pvlink::pv::{ActionState, ActionStatus, PvFactory};
use pvlink::PvError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ACQUIRE: &str = "BL13I-EA-DET-01:CAM:Acquire";
const ACQUIRE_RBV: &str = "BL13I-EA-DET-01:CAM:Acquire_RBV";

fn factory(transport: &LoopbackTransport, protocol: ActionProtocol) -> PvFactory {
    transport.define(ACQUIRE, PvValue::Int(0));
    transport.define(ACQUIRE_RBV, PvValue::Int(0));
    let cache = Arc::new(ChannelCache::new(Arc::new(transport.clone())));
    let device = DeviceConfig {
        protocol,
        ..DeviceConfig::with_base_name("BL13I-EA-DET-01:CAM:")
    };
    let config = PvConfig::default().with_status_poll_interval(Duration::from_millis(20));
    PvFactory::from_device_config(&device, cache, config).unwrap()
}

#[test]
fn test_completion_wakes_all_waiters() {
    let transport = LoopbackTransport::new();
    let acquisition = factory(&transport, ActionProtocol::Trigger).acquisition("Acquire");
    transport.set_put_behavior(ACQUIRE, PutBehavior::Hold);

    acquisition.start().unwrap();
    let returned = Arc::new(AtomicUsize::new(0));
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let acquisition = acquisition.clone();
            let returned = returned.clone();
            thread::spawn(move || {
                let state = acquisition.wait_while_busy(Duration::from_secs(5)).unwrap();
                returned.fetch_add(1, Ordering::SeqCst);
                state
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(returned.load(Ordering::SeqCst), 0);
    assert_eq!(transport.complete_pending(ACQUIRE, OpStatus::Normal), 1);

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), ActionState::Idle);
    }
    assert_eq!(returned.load(Ordering::SeqCst), 3);
}

#[test]
fn test_failed_completion_reports_fault_once_then_idle() {
    let transport = LoopbackTransport::new();
    let acquisition = factory(&transport, ActionProtocol::Trigger).acquisition("Acquire");
    transport.set_put_behavior(ACQUIRE, PutBehavior::Delayed(Duration::from_millis(30)));

    acquisition.start().unwrap();
    // Changing the behavior does not affect the write already in flight
    transport.set_put_behavior(ACQUIRE, PutBehavior::Immediate);
    assert_eq!(
        acquisition.wait_while_busy(Duration::from_secs(1)).unwrap(),
        ActionState::Idle
    );

    transport.set_put_behavior(ACQUIRE, PutBehavior::Fail("detector disconnected".into()));
    assert_eq!(
        acquisition.start_and_wait(Duration::from_secs(1)).unwrap(),
        ActionState::Fault
    );
    assert_eq!(acquisition.status().state(), ActionState::Idle);
    assert_eq!(
        acquisition.wait_while_busy(Duration::from_millis(10)).unwrap(),
        ActionState::Idle
    );
}

#[test]
fn test_second_start_while_busy_rejected() {
    let transport = LoopbackTransport::new();
    let acquisition = factory(&transport, ActionProtocol::Trigger).acquisition("Acquire");
    transport.set_put_behavior(ACQUIRE, PutBehavior::Hold);

    acquisition.start().unwrap();
    assert!(matches!(acquisition.start(), Err(PvError::Busy { .. })));

    transport.complete_pending(ACQUIRE, OpStatus::Normal);
    acquisition.wait_while_busy(Duration::from_secs(1)).unwrap();
    acquisition.start().unwrap();
}

#[test]
fn test_wait_times_out_while_busy() {
    let transport = LoopbackTransport::new();
    let acquisition = factory(&transport, ActionProtocol::Trigger).acquisition("Acquire");
    transport.set_put_behavior(ACQUIRE, PutBehavior::Hold);

    acquisition.start().unwrap();
    let err = acquisition
        .wait_while_busy(Duration::from_millis(80))
        .unwrap_err();
    assert!(err.is_timeout_at(WaitStage::Action));
    assert!(acquisition.is_busy());
}

#[test]
fn test_start_stop_protocol() {
    let transport = LoopbackTransport::new();
    let acquisition = factory(&transport, ActionProtocol::StartStop).acquisition("Acquire");
    transport.link_readback(ACQUIRE, ACQUIRE_RBV, Duration::from_millis(10));

    acquisition.start().unwrap();
    assert!(acquisition.is_busy());

    let stopper = acquisition.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stopper.stop()
    });

    assert_eq!(
        acquisition.wait_while_busy(Duration::from_secs(2)).unwrap(),
        ActionState::Idle
    );
    handle.join().unwrap().unwrap();
    assert_eq!(transport.value(ACQUIRE), Some(PvValue::Int(0)));
}

#[test]
fn test_status_shared_between_clones() {
    let status = ActionStatus::new("BL:SHUTTER");
    let other = status.clone();
    status.arm().unwrap();
    assert_eq!(other.state(), ActionState::Busy);
    other.complete(true);
    assert_eq!(status.state(), ActionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wait_while_busy_async() {
    let transport = LoopbackTransport::new();
    let acquisition = factory(&transport, ActionProtocol::Trigger).acquisition("Acquire");
    transport.set_put_behavior(ACQUIRE, PutBehavior::Delayed(Duration::from_millis(50)));

    acquisition.start().unwrap();
    let state = acquisition
        .wait_while_busy_async(Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(state, ActionState::Idle);
}
