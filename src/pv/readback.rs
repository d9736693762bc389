//! Demand/readback pairs
//!
//! Many remote settings expose two names: a demand that accepts writes and a
//! readback that reports what the hardware actually did. [`DemandReadback`]
//! writes the demand and, depending on its [`Convergence`] policy, waits for
//! the readback to catch up.
//!
//! # Examples
//!
//! ```
//! use pvlink::io::{ChannelCache, LoopbackTransport};
//! use pvlink::pv::{Attribute, Convergence, DemandReadback, ReadOnlyAttribute};
//! use pvlink::protocol::value::PvValue;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let transport = LoopbackTransport::new();
//! transport.define("BL:CAM:Gain", PvValue::Double(1.0));
//! transport.define("BL:CAM:Gain_RBV", PvValue::Double(1.0));
//! transport.link_readback("BL:CAM:Gain", "BL:CAM:Gain_RBV", Duration::from_millis(20));
//! let cache = Arc::new(ChannelCache::new(Arc::new(transport)));
//!
//! let gain = DemandReadback::new(
//!     Attribute::<f64>::new("BL:CAM:Gain", cache.clone(), Duration::from_secs(1)),
//!     ReadOnlyAttribute::new("BL:CAM:Gain_RBV", cache, Duration::from_secs(1)),
//!     Convergence::WaitUntilEqual,
//! );
//! gain.put(4.0)?;
//! assert_eq!(gain.get()?, 4.0);
//! # Ok::<(), pvlink::PvError>(())
//! ```

use crate::error::{PvError, Result, WaitStage};
use crate::protocol::value::{EnumIndex, PvData, Waveform};
use crate::pv::attribute::{Attribute, ReadOnlyAttribute};
use std::time::Duration;
use tracing::debug;

/// Default relative tolerance for floating-point convergence
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// When a demand write counts as done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Convergence {
    /// As soon as the demand write is acknowledged
    #[default]
    None,
    /// When the readback matches, within the demand's default timeout
    WaitUntilEqual,
    /// When the readback matches, within the given timeout
    WaitUntilEqualWithin(Duration),
}

/// Readback-to-demand comparison
///
/// Integers, strings, booleans and enum indices compare exactly. Floats
/// converge when `|readback - demand| <= tolerance * max(1, |readback|, |demand|)`;
/// NaN never converges. Arrays compare element-wise and must have equal
/// length.
pub trait Convergent {
    /// True if `self`, read back, reflects `demand`
    fn converges_to(&self, demand: &Self, tolerance: f64) -> bool;
}

fn float_converges(readback: f64, demand: f64, tolerance: f64) -> bool {
    if readback.is_nan() || demand.is_nan() {
        return false;
    }
    let scale = 1f64.max(readback.abs()).max(demand.abs());
    (readback - demand).abs() <= tolerance * scale
}

macro_rules! exact_convergent {
    ($($ty:ty),*) => {
        $(
            impl Convergent for $ty {
                fn converges_to(&self, demand: &Self, _tolerance: f64) -> bool {
                    self == demand
                }
            }
        )*
    };
}

exact_convergent!(
    bool, i8, i16, i32, String, EnumIndex, Waveform,
    Vec<i8>, Vec<i16>, Vec<i32>, Vec<String>
);

impl Convergent for f64 {
    fn converges_to(&self, demand: &Self, tolerance: f64) -> bool {
        float_converges(*self, *demand, tolerance)
    }
}

impl Convergent for f32 {
    fn converges_to(&self, demand: &Self, tolerance: f64) -> bool {
        float_converges(*self as f64, *demand as f64, tolerance)
    }
}

macro_rules! float_array_convergent {
    ($($ty:ty),*) => {
        $(
            impl Convergent for Vec<$ty> {
                fn converges_to(&self, demand: &Self, tolerance: f64) -> bool {
                    self.len() == demand.len()
                        && self
                            .iter()
                            .zip(demand)
                            .all(|(r, d)| r.converges_to(d, tolerance))
                }
            }
        )*
    };
}

float_array_convergent!(f32, f64);

/// A writable demand paired with its read-only readback
pub struct DemandReadback<T: PvData + Convergent> {
    demand: Attribute<T>,
    readback: ReadOnlyAttribute<T>,
    policy: Convergence,
    tolerance: f64,
}

impl<T: PvData + Convergent> Clone for DemandReadback<T> {
    fn clone(&self) -> Self {
        Self {
            demand: self.demand.clone(),
            readback: self.readback.clone(),
            policy: self.policy,
            tolerance: self.tolerance,
        }
    }
}

impl<T: PvData + Convergent> std::fmt::Debug for DemandReadback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemandReadback")
            .field("demand", &self.demand.name())
            .field("readback", &self.readback.name())
            .field("policy", &self.policy)
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl<T: PvData + Convergent> DemandReadback<T> {
    /// Pair a demand with its readback
    pub fn new(demand: Attribute<T>, readback: ReadOnlyAttribute<T>, policy: Convergence) -> Self {
        Self {
            demand,
            readback,
            policy,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Override the relative float tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Read the readback
    pub fn get(&self) -> Result<T> {
        self.readback.get()
    }

    /// Write the demand and, if the policy asks for it, wait for the readback
    ///
    /// # Errors
    ///
    /// - [`PvError::Communication`] if the demand write is rejected
    /// - [`PvError::Timeout`] at [`WaitStage::PutCallback`] if the demand
    ///   write is never acknowledged
    /// - [`PvError::Timeout`] at [`WaitStage::Convergence`] if the write was
    ///   accepted but the readback never matched
    pub fn put(&self, value: T) -> Result<()> {
        self.demand.put_wait(value.clone())?;

        let timeout = match self.policy {
            Convergence::None => return Ok(()),
            Convergence::WaitUntilEqual => self.demand.default_timeout(),
            Convergence::WaitUntilEqualWithin(timeout) => timeout,
        };

        debug!(
            demand = self.demand.name(),
            readback = self.readback.name(),
            ?timeout,
            "Waiting for readback to converge"
        );
        let tolerance = self.tolerance;
        self.readback
            .wait_for_value(|rb| rb.converges_to(&value, tolerance), timeout)
            .map(|_| ())
            .map_err(|e| {
                if e.is_timeout_at(WaitStage::Value) {
                    PvError::timeout(self.readback.name(), WaitStage::Convergence, timeout)
                } else {
                    e
                }
            })
    }

    /// [`put`](Self::put) on the tokio blocking pool
    pub async fn put_async(&self, value: T) -> Result<()> {
        let pair = self.clone();
        tokio::task::spawn_blocking(move || pair.put(value))
            .await
            .map_err(|e| PvError::communication(self.demand.name(), e))?
    }

    pub fn demand(&self) -> &Attribute<T> {
        &self.demand
    }

    pub fn readback(&self) -> &ReadOnlyAttribute<T> {
        &self.readback
    }

    pub fn policy(&self) -> Convergence {
        self.policy
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}
