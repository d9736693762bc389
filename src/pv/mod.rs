//! Process-attribute handles
//!
//! Typed handles on remote attributes, demand/readback pairs, the action
//! status machine and the factory that builds them from a device prefix.

pub mod attribute;
pub mod factory;
pub mod monitor;
pub mod readback;
pub mod status;

pub use attribute::{Attribute, ReadOnlyAttribute};
pub use factory::PvFactory;
pub use monitor::Subscription;
pub use readback::{Convergence, Convergent, DemandReadback};
pub use status::{ActionState, ActionStatus};
