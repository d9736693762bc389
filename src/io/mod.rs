//! Channel access layer
//!
//! Provides the transport interface, the per-name channel cache and an
//! in-process transport.

pub mod cache;
pub mod loopback;
pub mod transport;

pub use cache::ChannelCache;
pub use loopback::{LoopbackTransport, PutBehavior};
pub use transport::{Channel, MonitorEvent, MonitorId, MonitorListener, OpStatus, PutCallback, Transport};
