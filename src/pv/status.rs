//! Status machine for write-triggered remote actions
//!
//! Some writes start a long-running remote action (an exposure, a motor
//! move) whose end is signalled only by the write's completion callback.
//! [`ActionStatus`] tracks such an action as IDLE, BUSY or FAULT:
//!
//! ```text
//!            arm()                 complete(true)
//!   IDLE ──────────────▶ BUSY ─────────────────────▶ IDLE
//!    ▲                    │  complete(false)
//!    │    await_idle()    ▼
//!    └─────────────── FAULT ──── arm() ──▶ BUSY
//! ```
//!
//! Every transition happens under one lock and wakes all waiters. The
//! current state can also be read without the lock.

use crate::error::{PvError, Result, WaitStage};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Shortest re-check interval used by [`ActionStatus::await_idle`]
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// State of a triggered action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActionState {
    Idle = 0,
    Busy = 1,
    Fault = 2,
}

impl ActionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ActionState::Busy,
            2 => ActionState::Fault,
            _ => ActionState::Idle,
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionState::Idle => "IDLE",
            ActionState::Busy => "BUSY",
            ActionState::Fault => "FAULT",
        };
        f.write_str(s)
    }
}

struct Machine {
    state: ActionState,
    // Incremented by every arm()
    generation: u64,
    // Generation and result of the most recent completion
    last_outcome: Option<(u64, ActionState)>,
}

struct Shared {
    name: String,
    machine: Mutex<Machine>,
    changed: Condvar,
    mirror: AtomicU8,
}

/// Shared IDLE/BUSY/FAULT status of one remote action
///
/// Clones share the same state.
#[derive(Clone)]
pub struct ActionStatus {
    shared: Arc<Shared>,
}

impl fmt::Debug for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionStatus")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl ActionStatus {
    /// Create an IDLE status; `name` labels log lines and errors
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                machine: Mutex::new(Machine {
                    state: ActionState::Idle,
                    generation: 0,
                    last_outcome: None,
                }),
                changed: Condvar::new(),
                mirror: AtomicU8::new(ActionState::Idle as u8),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current state, read without taking the lock
    pub fn state(&self) -> ActionState {
        ActionState::from_u8(self.shared.mirror.load(Ordering::Acquire))
    }

    pub fn is_busy(&self) -> bool {
        self.state() == ActionState::Busy
    }

    fn set(&self, machine: &mut Machine, state: ActionState) {
        machine.state = state;
        self.shared.mirror.store(state as u8, Ordering::Release);
        self.shared.changed.notify_all();
    }

    /// IDLE or FAULT to BUSY
    ///
    /// # Errors
    ///
    /// [`PvError::Busy`] if an action is already in progress.
    pub fn arm(&self) -> Result<()> {
        let mut machine = self.shared.machine.lock();
        if machine.state == ActionState::Busy {
            return Err(PvError::Busy {
                pv: self.shared.name.clone(),
                reason: "action already in progress".to_string(),
            });
        }
        machine.generation += 1;
        self.set(&mut machine, ActionState::Busy);
        info!(action = %self.shared.name, generation = machine.generation, "Action armed");
        Ok(())
    }

    /// BUSY to IDLE (success) or FAULT (failure)
    ///
    /// A completion that arrives while not BUSY is logged and ignored.
    pub fn complete(&self, success: bool) {
        let mut machine = self.shared.machine.lock();
        if machine.state != ActionState::Busy {
            warn!(
                action = %self.shared.name,
                state = %machine.state,
                success,
                "Completion while not busy, ignored"
            );
            return;
        }
        let outcome = if success {
            ActionState::Idle
        } else {
            ActionState::Fault
        };
        machine.last_outcome = Some((machine.generation, outcome));
        self.set(&mut machine, outcome);
        info!(action = %self.shared.name, outcome = %outcome, "Action completed");
    }

    /// BUSY to IDLE without a completion, for an action that never started
    pub fn disarm(&self) {
        let mut machine = self.shared.machine.lock();
        if machine.state == ActionState::Busy {
            machine.last_outcome = Some((machine.generation, ActionState::Idle));
            self.set(&mut machine, ActionState::Idle);
            debug!(action = %self.shared.name, "Action disarmed");
        }
    }

    /// Block until the action is no longer BUSY
    ///
    /// Re-checks at least every `poll_interval`, which is raised to
    /// [`MIN_POLL_INTERVAL`] if shorter. A FAULT is reported as
    /// `Ok(ActionState::Fault)` and reset to IDLE; every waiter blocked on
    /// the faulted action sees it.
    ///
    /// # Errors
    ///
    /// [`PvError::Timeout`] with stage [`WaitStage::Action`] if the action is
    /// still BUSY at the deadline.
    pub fn await_idle(&self, poll_interval: Duration, timeout: Duration) -> Result<ActionState> {
        let deadline = Instant::now() + timeout;
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        let mut machine = self.shared.machine.lock();
        let watched = machine.generation;
        let mut waited = false;

        loop {
            if machine.generation != watched {
                // The watched action finished and a new one was armed
                return Ok(Self::outcome_of(&machine, watched));
            }
            match machine.state {
                ActionState::Idle if waited => return Ok(Self::outcome_of(&machine, watched)),
                ActionState::Idle => return Ok(ActionState::Idle),
                ActionState::Fault => {
                    self.set(&mut machine, ActionState::Idle);
                    info!(action = %self.shared.name, "Fault observed, status reset to IDLE");
                    return Ok(ActionState::Fault);
                }
                ActionState::Busy => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PvError::timeout(
                            self.shared.name.clone(),
                            WaitStage::Action,
                            timeout,
                        ));
                    }
                    waited = true;
                    let wake = deadline.min(now + poll_interval);
                    self.shared.changed.wait_until(&mut machine, wake);
                }
            }
        }
    }

    fn outcome_of(machine: &Machine, generation: u64) -> ActionState {
        match machine.last_outcome {
            Some((g, ActionState::Fault)) if g == generation => ActionState::Fault,
            _ => ActionState::Idle,
        }
    }

    /// [`await_idle`](Self::await_idle) on the tokio blocking pool
    pub async fn await_idle_async(
        &self,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<ActionState> {
        let status = self.clone();
        tokio::task::spawn_blocking(move || status.await_idle(poll_interval, timeout))
            .await
            .map_err(|e| PvError::communication(self.name(), e))?
    }
}
