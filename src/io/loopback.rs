//! In-process channel provider
//!
//! [`LoopbackTransport`] hosts named values in memory and behaves like a
//! small channel server: gets convert to the requested type, puts convert to
//! the hosted type and notify monitors, and put completions are delivered
//! from a separate thread. Test and demo code script the remote side through
//! the extra methods (`set_value`, `set_put_behavior`, `link_readback`, ...).
//!
//! # Examples
//!
//! ```
//! use pvlink::io::loopback::LoopbackTransport;
//! use pvlink::io::transport::Transport;
//! use pvlink::protocol::value::{PvType, PvValue};
//! use std::time::Duration;
//!
//! let transport = LoopbackTransport::new();
//! transport.define("BL:X", PvValue::Double(0.0));
//! transport.define("BL:X:RBV", PvValue::Double(0.0));
//! transport.link_readback("BL:X", "BL:X:RBV", Duration::from_millis(10));
//!
//! let channel = transport.connect("BL:X")?;
//! channel.put(PvValue::Int(3), None)?;
//! assert_eq!(channel.get(PvType::Double, None)?, PvValue::Double(3.0));
//! # Ok::<(), pvlink::PvError>(())
//! ```

use crate::error::{PvError, Result};
use crate::io::transport::{
    Channel, MonitorEvent, MonitorId, MonitorListener, OpStatus, PutCallback, Transport,
};
use crate::protocol::record::ImageRecord;
use crate::protocol::value::{PvType, PvValue};
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::trace;

/// How the simulated server acknowledges writes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PutBehavior {
    /// Apply the value and acknowledge straight away
    #[default]
    Immediate,
    /// Apply the value, acknowledge after the delay
    Delayed(Duration),
    /// Apply the value, acknowledge only on [`LoopbackTransport::complete_pending`]
    Hold,
    /// Reject the write; the value is left unchanged
    Fail(String),
}

struct Link {
    readback: String,
    delay: Duration,
}

// Highest value version handed to one monitor. Delivery to a monitor runs
// under its gate, so events reach it in version order and older ones are
// dropped. Reentrant so a listener may write the same channel.
type Gate = Arc<ReentrantMutex<Cell<u64>>>;

struct Monitor {
    ty: PvType,
    listener: MonitorListener,
    gate: Gate,
}

struct Notification {
    listener: MonitorListener,
    gate: Gate,
    version: u64,
    event: MonitorEvent,
}

struct Hosted {
    value: PvValue,
    // Bumped on every value change
    version: u64,
    record: Option<ImageRecord>,
    behavior: PutBehavior,
    pending: Vec<PutCallback>,
    monitors: HashMap<u64, Monitor>,
    links: Vec<Link>,
    unreachable: bool,
    connects: usize,
    puts: usize,
}

impl Hosted {
    fn new(value: PvValue) -> Self {
        Hosted {
            value,
            version: 1,
            record: None,
            behavior: PutBehavior::default(),
            pending: Vec::new(),
            monitors: HashMap::new(),
            links: Vec::new(),
            unreachable: false,
            connects: 0,
            puts: 0,
        }
    }

    /// Replace the value and bump the version
    fn store(&mut self, value: PvValue) {
        self.value = value;
        self.version += 1;
    }

    fn event_for(&self, ty: PvType) -> MonitorEvent {
        match self.value.convert(ty) {
            Some(value) => MonitorEvent::value(value),
            None => MonitorEvent {
                value: None,
                status: OpStatus::Failed(format!(
                    "cannot convert {:?} to {:?}",
                    self.value.pv_type(),
                    ty
                )),
            },
        }
    }

    /// Every monitor paired with the event for the current value
    fn notifications(&self) -> Vec<Notification> {
        self.monitors
            .values()
            .map(|monitor| Notification {
                listener: monitor.listener.clone(),
                gate: monitor.gate.clone(),
                version: self.version,
                event: self.event_for(monitor.ty),
            })
            .collect()
    }
}

#[derive(Default)]
struct Shared {
    hosted: Mutex<HashMap<String, Hosted>>,
    // Connect attempts on names that were not hosted at the time
    failed_connects: Mutex<HashMap<String, usize>>,
    next_monitor: AtomicU64,
}

impl Shared {
    fn set_value(&self, name: &str, value: PvValue) {
        let notifications = {
            let mut hosted = self.hosted.lock();
            let Some(entry) = hosted.get_mut(name) else {
                return;
            };
            let native = value.convert(entry.value.pv_type()).unwrap_or(value);
            entry.store(native);
            entry.notifications()
        };
        deliver(name, notifications);
    }
}

fn deliver(name: &str, notifications: Vec<Notification>) {
    for notification in notifications {
        let delivered = notification.gate.lock();
        if delivered.get() >= notification.version {
            trace!(pv = name, version = notification.version, "Dropping superseded event");
            continue;
        }
        delivered.set(notification.version);
        trace!(pv = name, value = ?notification.event.value, "Monitor delivery");
        (notification.listener)(notification.event);
    }
}

/// In-memory channel provider
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    shared: Arc<Shared>,
}

impl LoopbackTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Host `name` with an initial value; redefining keeps monitors
    pub fn define(&self, name: &str, value: PvValue) {
        let notifications = {
            let mut hosted = self.shared.hosted.lock();
            match hosted.get_mut(name) {
                Some(entry) => {
                    entry.store(value);
                    entry.notifications()
                }
                None => {
                    hosted.insert(name.to_string(), Hosted::new(value));
                    Vec::new()
                }
            }
        };
        deliver(name, notifications);
    }

    /// Change a hosted value as the server would, notifying monitors
    pub fn set_value(&self, name: &str, value: PvValue) {
        self.shared.set_value(name, value);
    }

    /// Current hosted value
    pub fn value(&self, name: &str) -> Option<PvValue> {
        self.shared.hosted.lock().get(name).map(|h| h.value.clone())
    }

    /// Choose how writes to `name` are acknowledged
    pub fn set_put_behavior(&self, name: &str, behavior: PutBehavior) {
        if let Some(entry) = self.shared.hosted.lock().get_mut(name) {
            entry.behavior = behavior;
        }
    }

    /// Deliver `status` to every held put callback on `name`
    ///
    /// Returns how many callbacks were completed.
    pub fn complete_pending(&self, name: &str, status: OpStatus) -> usize {
        let pending = match self.shared.hosted.lock().get_mut(name) {
            Some(entry) => std::mem::take(&mut entry.pending),
            None => return 0,
        };
        let count = pending.len();
        for callback in pending {
            callback(status.clone());
        }
        count
    }

    /// After each write to `demand`, copy the value to `readback` once
    /// `delay` has passed
    pub fn link_readback(&self, demand: &str, readback: &str, delay: Duration) {
        if let Some(entry) = self.shared.hosted.lock().get_mut(demand) {
            entry.links.push(Link {
                readback: readback.to_string(),
                delay,
            });
        }
    }

    /// Host a structured record on `name`
    ///
    /// The scalar value of the channel tracks the record's unique id.
    pub fn set_record(&self, name: &str, record: ImageRecord) {
        let id = PvValue::Int(record.unique_id);
        {
            let mut hosted = self.shared.hosted.lock();
            hosted
                .entry(name.to_string())
                .or_insert_with(|| Hosted::new(id.clone()))
                .record = Some(record);
        }
        self.set_value(name, id);
    }

    /// Make `name` fail every connect and operation
    pub fn set_unreachable(&self, name: &str, unreachable: bool) {
        if let Some(entry) = self.shared.hosted.lock().get_mut(name) {
            entry.unreachable = unreachable;
        }
    }

    /// Number of connect attempts for `name`, failed ones included
    pub fn connect_count(&self, name: &str) -> usize {
        self.shared
            .hosted
            .lock()
            .get(name)
            .map_or(0, |h| h.connects)
            + self
                .shared
                .failed_connects
                .lock()
                .get(name)
                .copied()
                .unwrap_or(0)
    }

    /// Number of writes accepted for `name`
    pub fn put_count(&self, name: &str) -> usize {
        self.shared.hosted.lock().get(name).map_or(0, |h| h.puts)
    }

    /// Number of monitors currently installed on `name`
    pub fn monitor_count(&self, name: &str) -> usize {
        self.shared
            .hosted
            .lock()
            .get(name)
            .map_or(0, |h| h.monitors.len())
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self, name: &str) -> Result<Arc<dyn Channel>> {
        let mut hosted = self.shared.hosted.lock();
        match hosted.get_mut(name) {
            Some(entry) => {
                entry.connects += 1;
                if entry.unreachable {
                    return Err(PvError::communication(name, "channel unreachable"));
                }
            }
            None => {
                drop(hosted);
                *self
                    .shared
                    .failed_connects
                    .lock()
                    .entry(name.to_string())
                    .or_insert(0) += 1;
                return Err(PvError::communication(name, "no such channel"));
            }
        }

        Ok(Arc::new(LoopbackChannel {
            name: name.to_string(),
            shared: self.shared.clone(),
        }))
    }
}

struct LoopbackChannel {
    name: String,
    shared: Arc<Shared>,
}

impl LoopbackChannel {
    fn with_entry<R>(&self, f: impl FnOnce(&mut Hosted) -> Result<R>) -> Result<R> {
        let mut hosted = self.shared.hosted.lock();
        match hosted.get_mut(&self.name) {
            Some(entry) if entry.unreachable => {
                Err(PvError::communication(&self.name, "channel disconnected"))
            }
            Some(entry) => f(entry),
            None => Err(PvError::communication(&self.name, "channel destroyed")),
        }
    }
}

impl Channel for LoopbackChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, ty: PvType, count: Option<usize>) -> Result<PvValue> {
        self.with_entry(|entry| {
            let value = entry.value.convert(ty).ok_or_else(|| {
                PvError::communication(
                    &self.name,
                    format!("cannot convert {:?} to {:?}", entry.value.pv_type(), ty),
                )
            })?;
            Ok(match count {
                Some(count) => value.truncate(count),
                None => value,
            })
        })
    }

    fn put(&self, value: PvValue, callback: Option<PutCallback>) -> Result<()> {
        let (behavior, notifications, links, stored) = self.with_entry(|entry| {
            if let PutBehavior::Fail(_) = entry.behavior {
                return Ok((entry.behavior.clone(), Vec::new(), Vec::new(), None));
            }
            let native = value.convert(entry.value.pv_type()).ok_or_else(|| {
                PvError::communication(
                    &self.name,
                    format!(
                        "cannot write {:?} to {:?}",
                        value.pv_type(),
                        entry.value.pv_type()
                    ),
                )
            })?;
            entry.store(native.clone());
            entry.puts += 1;
            let links: Vec<(String, Duration)> = entry
                .links
                .iter()
                .map(|l| (l.readback.clone(), l.delay))
                .collect();
            Ok((
                entry.behavior.clone(),
                entry.notifications(),
                links,
                Some(native),
            ))
        })?;

        trace!(pv = %self.name, behavior = ?behavior, "Loopback put");
        deliver(&self.name, notifications);

        if let Some(stored) = stored {
            for (readback, delay) in links {
                let shared = self.shared.clone();
                let value = stored.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    shared.set_value(&readback, value);
                });
            }
        }

        let Some(callback) = callback else {
            return Ok(());
        };

        match behavior {
            PutBehavior::Immediate => {
                thread::spawn(move || callback(OpStatus::Normal));
            }
            PutBehavior::Delayed(delay) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    callback(OpStatus::Normal);
                });
            }
            PutBehavior::Hold => {
                self.with_entry(|entry| {
                    entry.pending.push(callback);
                    Ok(())
                })?;
            }
            PutBehavior::Fail(reason) => {
                thread::spawn(move || callback(OpStatus::Failed(reason)));
            }
        }
        Ok(())
    }

    fn add_monitor(&self, ty: PvType, listener: MonitorListener) -> Result<MonitorId> {
        let id = self.shared.next_monitor.fetch_add(1, Ordering::Relaxed);
        let gate: Gate = Arc::new(ReentrantMutex::new(Cell::new(0)));
        let initial = self.with_entry(|entry| {
            entry.monitors.insert(
                id,
                Monitor {
                    ty,
                    listener: listener.clone(),
                    gate: gate.clone(),
                },
            );
            Ok(entry.value.convert(ty).map(|value| Notification {
                listener,
                gate,
                version: entry.version,
                event: MonitorEvent::value(value),
            }))
        })?;

        // Servers send the current value as the first event of a new monitor.
        // A newer update that won the race to the gate supersedes it.
        deliver(&self.name, initial.into_iter().collect());
        Ok(MonitorId(id))
    }

    fn clear_monitor(&self, id: MonitorId) {
        if let Some(entry) = self.shared.hosted.lock().get_mut(&self.name) {
            entry.monitors.remove(&id.0);
        }
    }

    fn read_record(&self) -> Result<ImageRecord> {
        self.with_entry(|entry| {
            entry
                .record
                .clone()
                .ok_or_else(|| PvError::communication(&self.name, "no record published"))
        })
    }
}
