//! Detector acquisition control
//!
//! An [`Acquisition`] drives the acquire attribute of a detector and tracks
//! the resulting exposure with an [`ActionStatus`]. Two protocols exist:
//!
//! - [`ActionProtocol::Trigger`]: write 1 without waiting; the detector
//!   acknowledges the write when the exposure ends, and that
//!   acknowledgement completes the status.
//! - [`ActionProtocol::StartStop`]: write 1 and wait for the write; the
//!   action runs until [`Acquisition::stop`] writes 0 and the acquire state
//!   reads back 0.
//!
//! # Examples
//!
//! ```
//! use pvlink::config::ActionProtocol;
//! use pvlink::device::Acquisition;
//! use pvlink::io::{ChannelCache, LoopbackTransport, PutBehavior};
//! use pvlink::pv::{ActionState, Attribute, ReadOnlyAttribute};
//! use pvlink::protocol::value::PvValue;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let transport = LoopbackTransport::new();
//! transport.define("BL:CAM:Acquire", PvValue::Int(0));
//! transport.define("BL:CAM:Acquire_RBV", PvValue::Int(0));
//! transport.set_put_behavior("BL:CAM:Acquire", PutBehavior::Delayed(Duration::from_millis(20)));
//! let cache = Arc::new(ChannelCache::new(Arc::new(transport)));
//!
//! let acquisition = Acquisition::new(
//!     Attribute::new("BL:CAM:Acquire", cache.clone(), Duration::from_secs(1)),
//!     ReadOnlyAttribute::new("BL:CAM:Acquire_RBV", cache, Duration::from_secs(1)),
//!     ActionProtocol::Trigger,
//!     Duration::from_millis(10),
//! );
//! let outcome = acquisition.start_and_wait(Duration::from_secs(2))?;
//! assert_eq!(outcome, ActionState::Idle);
//! # Ok::<(), pvlink::PvError>(())
//! ```

use crate::config::ActionProtocol;
use crate::error::{PvError, Result};
use crate::io::transport::OpStatus;
use crate::pv::attribute::{Attribute, ReadOnlyAttribute};
use crate::pv::status::{ActionState, ActionStatus};
use std::time::Duration;
use tracing::{info, warn};

/// Acquire-attribute driver with completion tracking
#[derive(Debug, Clone)]
pub struct Acquisition {
    acquire: Attribute<i32>,
    acquire_state: ReadOnlyAttribute<i32>,
    status: ActionStatus,
    protocol: ActionProtocol,
    poll_interval: Duration,
}

impl Acquisition {
    /// Create a driver
    ///
    /// # Arguments
    ///
    /// * `acquire` - Attribute written with 1 to start and 0 to stop
    /// * `acquire_state` - Readback reporting whether the detector is acquiring
    /// * `protocol` - How the end of an acquisition is detected
    /// * `poll_interval` - Re-check interval while waiting on the status
    pub fn new(
        acquire: Attribute<i32>,
        acquire_state: ReadOnlyAttribute<i32>,
        protocol: ActionProtocol,
        poll_interval: Duration,
    ) -> Self {
        let status = ActionStatus::new(acquire.name());
        Self {
            acquire,
            acquire_state,
            status,
            protocol,
            poll_interval,
        }
    }

    /// Start acquiring
    ///
    /// Does nothing if the detector already reports that it is acquiring.
    ///
    /// # Errors
    ///
    /// - [`PvError::Busy`] if a previous acquisition is still tracked as BUSY
    /// - Any error of the acquire write; the status is returned to IDLE
    pub fn start(&self) -> Result<()> {
        if self.acquire_state.get()? == 1 {
            info!(pv = self.acquire.name(), "Already acquiring");
            return Ok(());
        }

        self.status.arm()?;
        let result = match self.protocol {
            ActionProtocol::Trigger => {
                let status = self.status.clone();
                let name = self.acquire.name().to_string();
                self.acquire.put_no_wait_with(1, move |outcome| {
                    if let OpStatus::Failed(reason) = &outcome {
                        warn!(pv = %name, reason = %reason, "Acquisition failed");
                    }
                    status.complete(outcome.is_ok());
                })
            }
            ActionProtocol::StartStop => self.acquire.put_wait(1),
        };

        if let Err(e) = result {
            self.status.disarm();
            return Err(e);
        }
        info!(pv = self.acquire.name(), protocol = ?self.protocol, "Acquisition started");
        Ok(())
    }

    /// Stop acquiring and wait until the acquire state reads 0
    pub fn stop(&self) -> Result<()> {
        self.acquire.put_wait(0)?;
        self.acquire_state
            .wait_for_value(|state| *state == 0, self.acquire.default_timeout())?;
        if self.protocol == ActionProtocol::StartStop {
            self.status.complete(true);
        }
        info!(pv = self.acquire.name(), "Acquisition stopped");
        Ok(())
    }

    /// Block until the current acquisition is no longer BUSY
    ///
    /// Returns `ActionState::Fault` if it ended in failure.
    pub fn wait_while_busy(&self, timeout: Duration) -> Result<ActionState> {
        self.status.await_idle(self.poll_interval, timeout)
    }

    /// [`start`](Self::start) then [`wait_while_busy`](Self::wait_while_busy)
    pub fn start_and_wait(&self, timeout: Duration) -> Result<ActionState> {
        self.start()?;
        self.wait_while_busy(timeout)
    }

    /// [`wait_while_busy`](Self::wait_while_busy) on the tokio blocking pool
    pub async fn wait_while_busy_async(&self, timeout: Duration) -> Result<ActionState> {
        self.status
            .await_idle_async(self.poll_interval, timeout)
            .await
            .map_err(|e| match e {
                PvError::Timeout { stage, after, .. } => {
                    PvError::timeout(self.acquire.name(), stage, after)
                }
                other => other,
            })
    }

    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    pub fn status(&self) -> &ActionStatus {
        &self.status
    }

    pub fn protocol(&self) -> ActionProtocol {
        self.protocol
    }
}
