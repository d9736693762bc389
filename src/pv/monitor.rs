//! Monitor plumbing shared by the attribute handles
//!
//! A [`Subscription`] owns one installed monitor and removes it when
//! dropped. [`LatestSlot`] keeps only the most recent value delivered to a
//! monitor and lets threads block until that value satisfies a predicate.

use crate::io::transport::{Channel, MonitorId};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// An installed change monitor
///
/// Dropping the subscription clears the monitor on the channel. Events
/// already being delivered on another thread may still arrive shortly after.
pub struct Subscription {
    channel: Arc<dyn Channel>,
    id: MonitorId,
}

impl Subscription {
    pub(crate) fn new(channel: Arc<dyn Channel>, id: MonitorId) -> Self {
        Self { channel, id }
    }

    /// Name of the monitored attribute
    pub fn pv(&self) -> &str {
        self.channel.name()
    }

    /// Transport id of the monitor
    pub fn id(&self) -> MonitorId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        trace!(pv = self.channel.name(), id = self.id.0, "Clearing monitor");
        self.channel.clear_monitor(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("pv", &self.pv())
            .field("id", &self.id)
            .finish()
    }
}

/// Latest-value slot with blocking waits
pub(crate) struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    changed: Condvar,
}

impl<T: Clone> LatestSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: Mutex::new(None),
            changed: Condvar::new(),
        }
    }

    /// Store a delivered value and wake every waiter
    pub(crate) fn offer(&self, value: T) {
        *self.value.lock() = Some(value);
        self.changed.notify_all();
    }

    /// Store `value` only if nothing has been delivered yet
    pub(crate) fn seed(&self, value: T) {
        let mut slot = self.value.lock();
        if slot.is_none() {
            *slot = Some(value);
            drop(slot);
            self.changed.notify_all();
        }
    }

    /// The latest value, if any
    pub(crate) fn latest(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Block until the latest value satisfies `predicate`
    ///
    /// Returns `None` if `deadline` passes first.
    pub(crate) fn wait_until<F>(&self, mut predicate: F, deadline: Instant) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut slot = self.value.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                if predicate(value) {
                    return Some(value.clone());
                }
            }
            if self.changed.wait_until(&mut slot, deadline).timed_out() {
                return slot.as_ref().filter(|v| predicate(*v)).cloned();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_seed_does_not_override_delivery() {
        let slot = LatestSlot::new();
        slot.offer(2);
        slot.seed(1);
        assert_eq!(slot.latest(), Some(2));
    }

    #[test]
    fn test_wait_until_wakes_on_offer() {
        let slot = Arc::new(LatestSlot::new());
        slot.seed(0);

        let writer = slot.clone();
        let handle = thread::spawn(move || {
            for v in 1..=5 {
                thread::sleep(Duration::from_millis(5));
                writer.offer(v);
            }
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        assert_eq!(slot.wait_until(|v| *v >= 5, deadline), Some(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_until_times_out() {
        let slot = LatestSlot::new();
        slot.seed(1);
        let start = Instant::now();
        let deadline = start + Duration::from_millis(50);
        assert_eq!(slot.wait_until(|v| *v == 2, deadline), None);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
