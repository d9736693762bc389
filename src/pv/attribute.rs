//! Typed attribute handles
//!
//! An [`Attribute<T>`] is a capability for reading, writing and watching one
//! named remote value. It owns no remote state: every operation resolves the
//! channel through the shared [`ChannelCache`] and talks to whatever the
//! transport connected for that name.
//!
//! # Write semantics
//!
//! | Operation | Returns when |
//! |-----------|--------------|
//! | [`put_no_wait`](Attribute::put_no_wait) | the write is queued |
//! | [`put_no_wait_with`](Attribute::put_no_wait_with) | queued; callback runs later on another thread |
//! | [`put_async_start`](Attribute::put_async_start) | queued; completion tracked on the handle |
//! | [`put_wait`](Attribute::put_wait) | the remote end acknowledged the write |
//!
//! # Examples
//!
//! ```
//! use pvlink::io::{ChannelCache, LoopbackTransport};
//! use pvlink::pv::Attribute;
//! use pvlink::protocol::value::PvValue;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let transport = LoopbackTransport::new();
//! transport.define("BL:CAM:AcquireTime", PvValue::Double(0.1));
//! let cache = Arc::new(ChannelCache::new(Arc::new(transport)));
//!
//! let exposure: Attribute<f64> =
//!     Attribute::new("BL:CAM:AcquireTime", cache, Duration::from_secs(5));
//! exposure.put_wait(0.25)?;
//! assert_eq!(exposure.get()?, 0.25);
//! # Ok::<(), pvlink::PvError>(())
//! ```

use crate::error::{PvError, Result, WaitStage};
use crate::io::cache::ChannelCache;
use crate::io::transport::{Channel, MonitorEvent, OpStatus, PutCallback};
use crate::protocol::value::{PvData, PvValue};
use crate::pv::monitor::{LatestSlot, Subscription};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Completion tracking for the split put-with-callback operations
#[derive(Default)]
struct PutTracker {
    state: Mutex<TrackedPut>,
    done: Condvar,
}

#[derive(Default)]
struct TrackedPut {
    // Bumped by every start and cancel; stale callbacks compare against it
    generation: u64,
    pending: bool,
    outcome: Option<OpStatus>,
}

struct ValueMonitor<T> {
    slot: Arc<LatestSlot<T>>,
    _subscription: Subscription,
}

struct Inner<T> {
    name: String,
    cache: Arc<ChannelCache>,
    default_timeout: Duration,
    tracker: Arc<PutTracker>,
    monitor: Mutex<Option<ValueMonitor<T>>>,
}

/// Read/write handle on one named attribute
pub struct Attribute<T: PvData> {
    inner: Arc<Inner<T>>,
    _marker: PhantomData<T>,
}

impl<T: PvData> Clone for Attribute<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: PvData> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.inner.name)
            .field("type", &T::PV_TYPE)
            .finish()
    }
}

impl<T: PvData> Attribute<T> {
    /// Create a handle
    ///
    /// # Arguments
    ///
    /// * `name` - Fully-qualified attribute name
    /// * `cache` - Channel cache shared by all handles on the same transport
    /// * `default_timeout` - Timeout used by [`put_wait`](Self::put_wait)
    pub fn new(name: impl Into<String>, cache: Arc<ChannelCache>, default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                cache,
                default_timeout,
                tracker: Arc::new(PutTracker::default()),
                monitor: Mutex::new(None),
            }),
            _marker: PhantomData,
        }
    }

    /// Fully-qualified name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Timeout used by `put_wait`
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Resolve the channel without performing any operation
    pub fn connect(&self) -> Result<()> {
        self.channel().map(|_| ())
    }

    fn channel(&self) -> Result<Arc<dyn Channel>> {
        self.inner.cache.channel(&self.inner.name)
    }

    fn decode(&self, value: PvValue) -> Result<T> {
        let received = value.pv_type();
        T::from_value(value).ok_or_else(|| {
            PvError::communication(
                self.name(),
                format!("reply of type {:?} cannot be read as {:?}", received, T::PV_TYPE),
            )
        })
    }

    fn encode(&self, value: T) -> Result<PvValue> {
        let value = value.into_value();
        if !value.pv_type().is_writable() {
            return Err(PvError::Configuration(format!(
                "'{}': values of type {:?} cannot be written",
                self.name(),
                value.pv_type()
            )));
        }
        Ok(value)
    }

    /// Read the current value
    pub fn get(&self) -> Result<T> {
        let value = self.channel()?.get(T::PV_TYPE, None)?;
        debug!(pv = self.name(), value = %value, "get");
        self.decode(value)
    }

    /// Read only the first `count` elements of an array attribute
    pub fn get_n(&self, count: usize) -> Result<T> {
        let value = self.channel()?.get(T::PV_TYPE, Some(count))?;
        debug!(pv = self.name(), count, "get_n");
        self.decode(value)
    }

    /// Write and wait for the remote acknowledgement, using the default timeout
    pub fn put_wait(&self, value: T) -> Result<()> {
        self.put_wait_timeout(value, self.inner.default_timeout)
    }

    /// Write and wait up to `timeout` for the remote acknowledgement
    ///
    /// Each call waits on its own completion, so concurrent writers on one
    /// handle (or its clones) never see each other's outcome.
    ///
    /// # Errors
    ///
    /// - [`PvError::Timeout`] with stage [`WaitStage::PutCallback`] if no
    ///   acknowledgement arrives in time
    /// - [`PvError::Communication`] if the write fails or completes with a
    ///   failed status
    pub fn put_wait_timeout(&self, value: T, timeout: Duration) -> Result<()> {
        let value = self.encode(value)?;
        debug!(pv = self.name(), value = %value, ?timeout, "put_wait");

        let (tx, rx) = mpsc::channel();
        let callback: PutCallback = Box::new(move |status: OpStatus| {
            let _ = tx.send(status);
        });
        self.channel()?.put(value, Some(callback))?;

        match rx.recv_timeout(timeout) {
            Ok(OpStatus::Normal) => Ok(()),
            Ok(OpStatus::Failed(reason)) => Err(PvError::communication(self.name(), reason)),
            Err(_) => {
                debug!(pv = self.name(), ?timeout, "put callback timed out");
                Err(PvError::timeout(self.name(), WaitStage::PutCallback, timeout))
            }
        }
    }

    /// Write without waiting
    pub fn put_no_wait(&self, value: T) -> Result<()> {
        let value = self.encode(value)?;
        debug!(pv = self.name(), value = %value, "put_no_wait");
        self.channel()?.put(value, None)
    }

    /// Write without waiting; `on_complete` runs once with the completion status
    ///
    /// The callback may run on a transport thread; do not assume it runs on
    /// the calling thread.
    pub fn put_no_wait_with<F>(&self, value: T, on_complete: F) -> Result<()>
    where
        F: FnOnce(OpStatus) + Send + 'static,
    {
        let value = self.encode(value)?;
        debug!(pv = self.name(), value = %value, "put_no_wait with callback");
        let callback: PutCallback = Box::new(on_complete);
        self.channel()?.put(value, Some(callback))
    }

    /// Write and track the completion on this handle
    ///
    /// Pair with [`put_async_wait`](Self::put_async_wait). Only one tracked
    /// put may be in flight per handle.
    pub fn put_async_start(&self, value: T) -> Result<()> {
        let value = self.encode(value)?;
        let tracker = &self.inner.tracker;

        let generation = {
            let mut state = tracker.state.lock();
            if state.pending {
                return Err(PvError::Busy {
                    pv: self.name().to_string(),
                    reason: "a tracked put is still waiting for its callback".to_string(),
                });
            }
            state.generation += 1;
            state.pending = true;
            state.outcome = None;
            state.generation
        };

        let callback_tracker = tracker.clone();
        let name = self.inner.name.clone();
        let callback: PutCallback = Box::new(move |status: OpStatus| {
            let mut state = callback_tracker.state.lock();
            if state.generation != generation || !state.pending {
                trace!(pv = %name, "Ignoring callback of a cancelled put");
                return;
            }
            state.pending = false;
            state.outcome = Some(status);
            drop(state);
            callback_tracker.done.notify_all();
        });

        debug!(pv = self.name(), value = %value, "put_async_start");
        let result = self
            .channel()
            .and_then(|channel| channel.put(value, Some(callback)));
        if result.is_err() {
            let mut state = tracker.state.lock();
            if state.generation == generation {
                state.pending = false;
            }
        }
        result
    }

    /// Wait for the tracked put to complete
    ///
    /// Returns immediately when no tracked put is outstanding. On timeout
    /// the tracked put is abandoned so a new one can be started.
    pub fn put_async_wait(&self, timeout: Duration) -> Result<()> {
        let tracker = &self.inner.tracker;
        let deadline = Instant::now() + timeout;
        let mut state = tracker.state.lock();
        let generation = state.generation;

        loop {
            if state.generation != generation {
                return Err(PvError::communication(self.name(), "tracked put was cancelled"));
            }
            if let Some(status) = state.outcome.take() {
                debug!(pv = self.name(), status = %status, "put completed");
                return match status {
                    OpStatus::Normal => Ok(()),
                    OpStatus::Failed(reason) => Err(PvError::communication(self.name(), reason)),
                };
            }
            if !state.pending {
                return Ok(());
            }
            if tracker.done.wait_until(&mut state, deadline).timed_out() && state.pending {
                state.generation += 1;
                state.pending = false;
                debug!(pv = self.name(), ?timeout, "put callback timed out");
                return Err(PvError::timeout(self.name(), WaitStage::PutCallback, timeout));
            }
        }
    }

    /// True while a tracked put is waiting for its callback
    pub fn put_async_is_waiting(&self) -> bool {
        self.inner.tracker.state.lock().pending
    }

    /// Abandon the tracked put; its callback will be ignored
    pub fn put_async_cancel(&self) {
        let tracker = &self.inner.tracker;
        {
            let mut state = tracker.state.lock();
            state.generation += 1;
            state.pending = false;
            state.outcome = None;
        }
        tracker.done.notify_all();
        debug!(pv = self.name(), "put_async_cancel");
    }

    /// Block until `predicate` holds for the latest observed value
    ///
    /// A private monitor is installed for the duration of the call and
    /// removed on every exit path. Intermediate values may be skipped; the
    /// predicate only ever sees the most recent one.
    pub fn wait_for_value<P>(&self, mut predicate: P, timeout: Duration) -> Result<T>
    where
        P: FnMut(&T) -> bool,
    {
        let slot = Arc::new(LatestSlot::new());
        let _subscription = self.monitor_into(slot.clone())?;

        if slot.latest().is_none() {
            slot.seed(self.get()?);
        }

        debug!(pv = self.name(), ?timeout, "wait_for_value");
        let deadline = Instant::now() + timeout;
        slot.wait_until(&mut predicate, deadline)
            .ok_or_else(|| PvError::timeout(self.name(), WaitStage::Value, timeout))
    }

    /// Register a change observer
    ///
    /// The observer runs on a transport thread for every decodable value.
    /// Dropping the returned [`Subscription`] removes it.
    pub fn subscribe<F>(&self, observer: F) -> Result<Subscription>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = self.inner.name.clone();
        self.monitor_with(move |event| {
            if let Some(value) = decode_event::<T>(&name, event) {
                observer(value);
            }
        })
    }

    fn monitor_into(&self, slot: Arc<LatestSlot<T>>) -> Result<Subscription> {
        let name = self.inner.name.clone();
        self.monitor_with(move |event| {
            if let Some(value) = decode_event::<T>(&name, event) {
                slot.offer(value);
            }
        })
    }

    fn monitor_with<F>(&self, listener: F) -> Result<Subscription>
    where
        F: Fn(MonitorEvent) + Send + Sync + 'static,
    {
        let channel = self.channel()?;
        let id = channel.add_monitor(T::PV_TYPE, Arc::new(listener))?;
        trace!(pv = self.name(), id = id.0, "Monitor installed");
        Ok(Subscription::new(channel, id))
    }

    /// Keep (or drop) a persistent monitor feeding [`get_last`](Self::get_last)
    pub fn set_value_monitoring(&self, enabled: bool) -> Result<()> {
        let mut monitor = self.inner.monitor.lock();
        match (enabled, monitor.is_some()) {
            (true, false) => {
                let slot = Arc::new(LatestSlot::new());
                let subscription = self.monitor_into(slot.clone())?;
                *monitor = Some(ValueMonitor {
                    slot,
                    _subscription: subscription,
                });
                debug!(pv = self.name(), "Value monitoring enabled");
            }
            (false, true) => {
                *monitor = None;
                debug!(pv = self.name(), "Value monitoring disabled");
            }
            _ => {}
        }
        Ok(())
    }

    /// True while value monitoring is enabled
    pub fn is_value_monitoring(&self) -> bool {
        self.inner.monitor.lock().is_some()
    }

    /// Last monitored value, without a network round-trip
    ///
    /// Falls back to a read if no event has arrived yet.
    pub fn get_last(&self) -> Result<T> {
        let latest = match self.inner.monitor.lock().as_ref() {
            Some(monitor) => monitor.slot.latest(),
            None => {
                return Err(PvError::Configuration(format!(
                    "'{}': get_last requires value monitoring",
                    self.name()
                )))
            }
        };
        match latest {
            Some(value) => Ok(value),
            None => self.get(),
        }
    }

    /// [`put_wait`](Self::put_wait) on the tokio blocking pool
    pub async fn put_wait_async(&self, value: T) -> Result<()> {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.put_wait(value))
            .await
            .map_err(|e| PvError::communication(self.name(), e))?
    }

    /// [`wait_for_value`](Self::wait_for_value) on the tokio blocking pool
    pub async fn wait_for_value_async<P>(&self, predicate: P, timeout: Duration) -> Result<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.wait_for_value(predicate, timeout))
            .await
            .map_err(|e| PvError::communication(self.name(), e))?
    }
}

fn decode_event<T: PvData>(name: &str, event: MonitorEvent) -> Option<T> {
    if let OpStatus::Failed(reason) = &event.status {
        trace!(pv = name, reason = %reason, "Monitor event with failed status");
        return None;
    }
    let value = T::from_value(event.value?);
    if value.is_none() {
        trace!(pv = name, "Monitor event not decodable");
    }
    value
}

/// Read-only handle on one named attribute
///
/// Has no write operations, so a readback wrapped in one can never be
/// written by mistake.
pub struct ReadOnlyAttribute<T: PvData> {
    inner: Attribute<T>,
}

impl<T: PvData> Clone for ReadOnlyAttribute<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: PvData> fmt::Debug for ReadOnlyAttribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyAttribute")
            .field("name", &self.name())
            .field("type", &T::PV_TYPE)
            .finish()
    }
}

impl<T: PvData> From<Attribute<T>> for ReadOnlyAttribute<T> {
    fn from(inner: Attribute<T>) -> Self {
        Self { inner }
    }
}

impl<T: PvData> ReadOnlyAttribute<T> {
    /// Create a read-only handle
    pub fn new(name: impl Into<String>, cache: Arc<ChannelCache>, default_timeout: Duration) -> Self {
        Attribute::new(name, cache, default_timeout).into()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn connect(&self) -> Result<()> {
        self.inner.connect()
    }

    pub fn get(&self) -> Result<T> {
        self.inner.get()
    }

    pub fn get_n(&self, count: usize) -> Result<T> {
        self.inner.get_n(count)
    }

    /// See [`Attribute::wait_for_value`]
    pub fn wait_for_value<P>(&self, predicate: P, timeout: Duration) -> Result<T>
    where
        P: FnMut(&T) -> bool,
    {
        self.inner.wait_for_value(predicate, timeout)
    }

    pub async fn wait_for_value_async<P>(&self, predicate: P, timeout: Duration) -> Result<T>
    where
        P: FnMut(&T) -> bool + Send + 'static,
    {
        self.inner.wait_for_value_async(predicate, timeout).await
    }

    pub fn subscribe<F>(&self, observer: F) -> Result<Subscription>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.subscribe(observer)
    }

    pub fn set_value_monitoring(&self, enabled: bool) -> Result<()> {
        self.inner.set_value_monitoring(enabled)
    }

    pub fn is_value_monitoring(&self) -> bool {
        self.inner.is_value_monitoring()
    }

    pub fn get_last(&self) -> Result<T> {
        self.inner.get_last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::loopback::{LoopbackTransport, PutBehavior};
    use std::sync::mpsc;
    use std::thread;

    fn setup(name: &str, value: PvValue) -> (LoopbackTransport, Arc<ChannelCache>) {
        let transport = LoopbackTransport::new();
        transport.define(name, value);
        let cache = Arc::new(ChannelCache::new(Arc::new(transport.clone())));
        (transport, cache)
    }

    #[test]
    fn test_get_and_put_wait() {
        let (transport, cache) = setup("BL:X", PvValue::Double(1.5));
        let x: Attribute<f64> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        assert_eq!(x.get().unwrap(), 1.5);
        x.put_wait(2.5).unwrap();
        assert_eq!(transport.value("BL:X"), Some(PvValue::Double(2.5)));
        assert!(!x.put_async_is_waiting());
    }

    #[test]
    fn test_get_undecodable_reply() {
        let (_transport, cache) = setup("BL:NAME", PvValue::String("camera".into()));
        let x: Attribute<i32> = Attribute::new("BL:NAME", cache, Duration::from_secs(1));
        assert!(matches!(x.get(), Err(PvError::Communication { .. })));
    }

    #[test]
    fn test_put_wait_times_out_without_callback() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        transport.set_put_behavior("BL:X", PutBehavior::Hold);
        let x: Attribute<i32> = Attribute::new("BL:X", cache, Duration::from_millis(50));

        let err = x.put_wait(1).unwrap_err();
        assert!(err.is_timeout_at(WaitStage::PutCallback));
        // The abandoned put does not block the next one
        assert!(!x.put_async_is_waiting());
        // A late completion of the abandoned write goes nowhere
        transport.complete_pending("BL:X", OpStatus::Normal);
        transport.set_put_behavior("BL:X", PutBehavior::Immediate);
        x.put_wait(2).unwrap();
    }

    #[test]
    fn test_put_wait_failed_status() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        transport.set_put_behavior("BL:X", PutBehavior::Fail("limit violation".into()));
        let x: Attribute<i32> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        let err = x.put_wait(100).unwrap_err();
        assert!(
            matches!(err, PvError::Communication { ref reason, .. } if reason == "limit violation")
        );
    }

    #[test]
    fn test_second_tracked_put_is_busy() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        transport.set_put_behavior("BL:X", PutBehavior::Hold);
        let x: Attribute<i32> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        x.put_async_start(1).unwrap();
        assert!(x.put_async_is_waiting());
        assert!(matches!(x.put_async_start(2), Err(PvError::Busy { .. })));

        transport.complete_pending("BL:X", OpStatus::Normal);
        x.put_async_wait(Duration::from_secs(1)).unwrap();
        assert!(!x.put_async_is_waiting());
    }

    #[test]
    fn test_put_wait_alongside_tracked_put() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        transport.set_put_behavior("BL:X", PutBehavior::Delayed(Duration::from_millis(50)));
        let x: Attribute<i32> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        x.put_async_start(1).unwrap();
        x.put_wait(2).unwrap();
        x.put_async_wait(Duration::from_secs(1)).unwrap();
        assert_eq!(transport.put_count("BL:X"), 2);
    }

    #[test]
    fn test_put_wait_failure_not_hidden_by_tracked_wait() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        transport.set_put_behavior("BL:X", PutBehavior::Fail("interlock".into()));
        let x: Attribute<i32> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        let waiter = x.clone();
        let tracked = thread::spawn(move || waiter.put_async_wait(Duration::from_millis(200)));
        let err = x.put_wait(5).unwrap_err();
        assert!(matches!(err, PvError::Communication { ref reason, .. } if reason == "interlock"));
        // Nothing was tracked, so the tracked wait has nothing to report
        tracked.join().unwrap().unwrap();
    }

    #[test]
    fn test_put_async_cancel_ignores_late_callback() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        transport.set_put_behavior("BL:X", PutBehavior::Hold);
        let x: Attribute<i32> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        x.put_async_start(1).unwrap();
        x.put_async_cancel();
        assert!(!x.put_async_is_waiting());

        x.put_async_start(2).unwrap();
        // Completes both held callbacks; only the second is tracked
        assert_eq!(transport.complete_pending("BL:X", OpStatus::Normal), 2);
        x.put_async_wait(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_put_no_wait_with_callback_once() {
        let (_transport, cache) = setup("BL:X", PvValue::Int(0));
        let x: Attribute<i32> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        let caller = thread::current().id();
        let (tx, rx) = mpsc::channel();
        x.put_no_wait_with(4, move |status| {
            tx.send((status, thread::current().id())).unwrap();
        })
        .unwrap();

        let (status, thread_id) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(status, OpStatus::Normal);
        assert_ne!(thread_id, caller);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_string_array_write_rejected() {
        let (_transport, cache) = setup("BL:NAMES", PvValue::StringArray(vec![]));
        let names: Attribute<Vec<String>> = Attribute::new("BL:NAMES", cache, Duration::from_secs(1));

        assert!(matches!(
            names.put_no_wait(vec!["a".into()]),
            Err(PvError::Configuration(_))
        ));
        assert!(matches!(
            names.put_wait(vec!["a".into()]),
            Err(PvError::Configuration(_))
        ));
        assert_eq!(names.get().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_get_n() {
        let (_transport, cache) = setup("BL:WF", PvValue::DoubleArray(vec![1.0, 2.0, 3.0]));
        let wf: Attribute<Vec<f64>> = Attribute::new("BL:WF", cache, Duration::from_secs(1));
        assert_eq!(wf.get_n(2).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_wait_for_value_tears_down_monitor() {
        let (transport, cache) = setup("BL:COUNT", PvValue::Int(0));
        let count: Attribute<i32> = Attribute::new("BL:COUNT", cache, Duration::from_secs(1));

        let writer = transport.clone();
        let handle = thread::spawn(move || {
            for v in 1..=3 {
                thread::sleep(Duration::from_millis(10));
                writer.set_value("BL:COUNT", PvValue::Int(v));
            }
        });

        let seen = count
            .wait_for_value(|v| *v == 3, Duration::from_secs(2))
            .unwrap();
        handle.join().unwrap();
        assert_eq!(seen, 3);
        assert_eq!(transport.monitor_count("BL:COUNT"), 0);

        let err = count
            .wait_for_value(|v| *v == 10, Duration::from_millis(30))
            .unwrap_err();
        assert!(err.is_timeout_at(WaitStage::Value));
        assert_eq!(transport.monitor_count("BL:COUNT"), 0);
    }

    #[test]
    fn test_value_monitoring() {
        let (transport, cache) = setup("BL:TEMP", PvValue::Double(20.0));
        let temp: Attribute<f64> = Attribute::new("BL:TEMP", cache, Duration::from_secs(1));

        assert!(matches!(temp.get_last(), Err(PvError::Configuration(_))));
        temp.set_value_monitoring(true).unwrap();
        assert!(temp.is_value_monitoring());
        transport.set_value("BL:TEMP", PvValue::Double(21.5));
        assert_eq!(temp.get_last().unwrap(), 21.5);

        temp.set_value_monitoring(false).unwrap();
        assert_eq!(transport.monitor_count("BL:TEMP"), 0);
    }

    #[test]
    fn test_subscribe_and_drop() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        let x: Attribute<bool> = Attribute::new("BL:X", cache, Duration::from_secs(1));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = x.subscribe(move |v| sink.lock().push(v)).unwrap();
        transport.set_value("BL:X", PvValue::Int(1));
        drop(subscription);
        transport.set_value("BL:X", PvValue::Int(0));

        assert_eq!(*seen.lock(), vec![false, true]);
    }

    #[test]
    fn test_unreachable_channel() {
        let (transport, cache) = setup("BL:X", PvValue::Int(0));
        transport.set_unreachable("BL:X", true);
        let x: ReadOnlyAttribute<i32> = ReadOnlyAttribute::new("BL:X", cache, Duration::from_secs(1));
        assert!(matches!(x.get(), Err(PvError::Communication { .. })));
        assert!(x.connect().is_err());
    }
}
