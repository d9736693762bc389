//! Name-keyed channel cache
//!
//! Channels are created lazily the first time a name is resolved and kept
//! for the lifetime of the cache. Resolution is atomic per name: concurrent
//! callers asking for the same name share one connect, while callers for
//! different names never wait on each other.

use crate::error::Result;
use crate::io::transport::{Channel, Transport};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type Slot = Arc<OnceCell<Arc<dyn Channel>>>;

/// Cache of connected channels, keyed by fully-qualified name
pub struct ChannelCache {
    transport: Arc<dyn Transport>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ChannelCache {
    /// Create an empty cache over a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The channel for `name`, connecting on first use
    ///
    /// A failed connect is not remembered; the next call tries again.
    pub fn channel(&self, name: &str) -> Result<Arc<dyn Channel>> {
        // The map lock only covers slot lookup; the connect itself runs
        // under the slot's own once-cell.
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(name.to_string()).or_default().clone()
        };

        let result = slot.get_or_try_init(|| {
            debug!(pv = name, "Creating channel");
            self.transport.connect(name).map_err(|e| {
                warn!(pv = name, error = %e, "Channel creation failed");
                e
            })
        });

        match result {
            Ok(channel) => Ok(channel.clone()),
            Err(e) => {
                self.forget_empty(name, &slot);
                Err(e)
            }
        }
    }

    // Drop the slot for `name` if it is still ours and nobody connected it
    fn forget_empty(&self, name: &str, slot: &Slot) {
        let mut slots = self.slots.lock();
        let unused = slots
            .get(name)
            .map_or(false, |current| Arc::ptr_eq(current, slot) && current.get().is_none());
        if unused {
            slots.remove(name);
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of names with a connected channel
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// True if no channel has been connected yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if a channel for `name` is connected
    pub fn contains(&self, name: &str) -> bool {
        self.slots
            .lock()
            .get(name)
            .map_or(false, |slot| slot.get().is_some())
    }
}

impl std::fmt::Debug for ChannelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCache")
            .field("connected", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PvError;
    use crate::io::loopback::LoopbackTransport;
    use crate::protocol::value::PvValue;
    use std::thread;

    #[test]
    fn test_channel_is_cached() {
        let transport = Arc::new(LoopbackTransport::new());
        transport.define("BL:A", PvValue::Int(0));
        let cache = ChannelCache::new(transport.clone());

        assert!(cache.is_empty());
        let first = cache.channel("BL:A").unwrap();
        let second = cache.channel("BL:A").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.connect_count("BL:A"), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("BL:A"));
    }

    #[test]
    fn test_failed_connect_not_cached() {
        let transport = Arc::new(LoopbackTransport::new());
        let cache = ChannelCache::new(transport.clone());

        let err = cache.channel("BL:MISSING").err().unwrap();
        assert!(matches!(err, PvError::Communication { .. }));
        assert!(!cache.contains("BL:MISSING"));

        transport.define("BL:MISSING", PvValue::Double(1.0));
        assert!(cache.channel("BL:MISSING").is_ok());
        assert_eq!(transport.connect_count("BL:MISSING"), 2);
    }

    #[test]
    fn test_failed_lookups_leave_no_slots() {
        let transport = Arc::new(LoopbackTransport::new());
        transport.define("BL:A", PvValue::Int(0));
        let cache = ChannelCache::new(transport);

        cache.channel("BL:A").unwrap();
        for i in 0..100 {
            assert!(cache.channel(&format!("BL:TYPO{}", i)).is_err());
        }
        assert_eq!(cache.slot_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_resolution_connects_once() {
        let transport = Arc::new(LoopbackTransport::new());
        transport.define("BL:SHARED", PvValue::Int(0));
        let cache = Arc::new(ChannelCache::new(transport.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.channel("BL:SHARED").map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(transport.connect_count("BL:SHARED"), 1);
    }
}
