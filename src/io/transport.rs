//! Channel provider interface
//!
//! The network layer is an external collaborator. Everything in this crate
//! talks to it through two traits: a [`Transport`] that turns a name into a
//! connected [`Channel`], and the channel itself, which reads, writes and
//! delivers change notifications.
//!
//! Implementations must be thread-safe. Put callbacks and monitor listeners
//! may run on any thread, including one owned by the transport.

use crate::error::{PvError, Result};
use crate::protocol::record::ImageRecord;
use crate::protocol::value::{PvType, PvValue};
use std::fmt;
use std::sync::Arc;

/// Completion status of a write or a monitor delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpStatus {
    /// The operation completed normally
    Normal,
    /// The remote end or the transport reported a failure
    Failed(String),
}

impl OpStatus {
    /// True for [`OpStatus::Normal`]
    pub fn is_ok(&self) -> bool {
        matches!(self, OpStatus::Normal)
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpStatus::Normal => f.write_str("normal"),
            OpStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One change notification
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorEvent {
    /// New value; `None` when the delivery carries only a status
    pub value: Option<PvValue>,
    /// Delivery status
    pub status: OpStatus,
}

impl MonitorEvent {
    /// A successful delivery of `value`
    pub fn value(value: PvValue) -> Self {
        MonitorEvent {
            value: Some(value),
            status: OpStatus::Normal,
        }
    }
}

/// Invoked exactly once when a write completes
pub type PutCallback = Box<dyn FnOnce(OpStatus) + Send + 'static>;

/// Invoked for every change notification on a monitor
pub type MonitorListener = Arc<dyn Fn(MonitorEvent) + Send + Sync + 'static>;

/// Handle of an installed monitor, unique per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(pub u64);

/// A connected channel to one named attribute
pub trait Channel: Send + Sync {
    /// Fully-qualified name
    fn name(&self) -> &str;

    /// Read the current value converted to `ty`
    ///
    /// `count` limits array reads to their first elements.
    fn get(&self, ty: PvType, count: Option<usize>) -> Result<PvValue>;

    /// Write a value
    ///
    /// Returns once the write is queued. When `callback` is given it is
    /// invoked exactly once with the completion status, on a thread of the
    /// transport's choosing. A synchronous error means the callback will
    /// never run.
    fn put(&self, value: PvValue, callback: Option<PutCallback>) -> Result<()>;

    /// Install a change listener delivering values converted to `ty`
    fn add_monitor(&self, ty: PvType, listener: MonitorListener) -> Result<MonitorId>;

    /// Remove a listener; unknown ids are ignored
    fn clear_monitor(&self, id: MonitorId);

    /// Read one structured record snapshot
    ///
    /// Only image sources support this.
    fn read_record(&self) -> Result<ImageRecord> {
        Err(PvError::communication(
            self.name(),
            "channel does not carry structured records",
        ))
    }
}

/// Channel provider
pub trait Transport: Send + Sync {
    /// Create a connected channel for `name`
    fn connect(&self, name: &str) -> Result<Arc<dyn Channel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScalarOnly;

    impl Channel for ScalarOnly {
        fn name(&self) -> &str {
            "BL:SCALAR"
        }

        fn get(&self, ty: PvType, _count: Option<usize>) -> Result<PvValue> {
            PvValue::Int(1)
                .convert(ty)
                .ok_or_else(|| PvError::communication(self.name(), "bad type"))
        }

        fn put(&self, _value: PvValue, callback: Option<PutCallback>) -> Result<()> {
            if let Some(callback) = callback {
                callback(OpStatus::Normal);
            }
            Ok(())
        }

        fn add_monitor(&self, _ty: PvType, _listener: MonitorListener) -> Result<MonitorId> {
            Ok(MonitorId(0))
        }

        fn clear_monitor(&self, _id: MonitorId) {}
    }

    #[test]
    fn test_read_record_unsupported_by_default() {
        let err = ScalarOnly.read_record().unwrap_err();
        assert!(matches!(err, PvError::Communication { ref pv, .. } if pv == "BL:SCALAR"));
    }

    #[test]
    fn test_op_status() {
        assert!(OpStatus::Normal.is_ok());
        let failed = OpStatus::Failed("write rejected".into());
        assert!(!failed.is_ok());
        assert_eq!(failed.to_string(), "failed: write rejected");
    }

    #[test]
    fn test_channel_get_converts() {
        assert_eq!(
            ScalarOnly.get(PvType::Double, None).unwrap(),
            PvValue::Double(1.0)
        );
    }
}
