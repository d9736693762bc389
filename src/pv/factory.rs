//! Handle factory with device-prefix naming
//!
//! Detector attributes share a common prefix (`BL13I-EA-DET-01:CAM:`) and
//! differ only by suffix (`AcquireTime`, `AcquireTime_RBV`, ...). A
//! [`PvFactory`] holds the prefix, the channel cache and the shared
//! configuration, and builds every kind of handle from a suffix.
//!
//! # Examples
//!
//! ```
//! use pvlink::config::PvConfig;
//! use pvlink::io::{ChannelCache, LoopbackTransport};
//! use pvlink::pv::PvFactory;
//! use pvlink::protocol::value::PvValue;
//! use std::sync::Arc;
//!
//! let transport = LoopbackTransport::new();
//! transport.define("BL:CAM:NumImages", PvValue::Int(1));
//! let cache = Arc::new(ChannelCache::new(Arc::new(transport)));
//!
//! let factory = PvFactory::new("BL:CAM:", cache, PvConfig::default())?;
//! let images = factory.attribute::<i32>("NumImages");
//! assert_eq!(images.name(), "BL:CAM:NumImages");
//! images.put_wait(10)?;
//! # Ok::<(), pvlink::PvError>(())
//! ```

use crate::config::{ActionProtocol, DeviceConfig, PvConfig};
use crate::device::acquire::Acquisition;
use crate::device::image::ImageReader;
use crate::error::{PvError, Result, WaitStage};
use crate::io::cache::ChannelCache;
use crate::io::transport::{OpStatus, PutCallback};
use crate::protocol::image::DecodeOptions;
use crate::protocol::value::{PvData, PvType, PvValue};
use crate::pv::attribute::{Attribute, ReadOnlyAttribute};
use crate::pv::readback::{Convergence, Convergent, DemandReadback};
use crate::pv::status::ActionStatus;
use std::sync::{mpsc, Arc};
use tracing::{debug, warn};

/// Suffix appended to a demand name to form its readback name
pub const READBACK_SUFFIX: &str = "_RBV";

/// Builds handles named `base + suffix`
#[derive(Debug, Clone)]
pub struct PvFactory {
    base: String,
    cache: Arc<ChannelCache>,
    config: PvConfig,
    convergence: Convergence,
    protocol: ActionProtocol,
    decode_options: DecodeOptions,
}

impl PvFactory {
    /// Create a factory
    ///
    /// # Errors
    ///
    /// [`PvError::Configuration`] if `base` is empty.
    pub fn new(base: impl Into<String>, cache: Arc<ChannelCache>, config: PvConfig) -> Result<Self> {
        let base = base.into();
        if base.is_empty() {
            return Err(PvError::Configuration(
                "base name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            base,
            cache,
            config,
            convergence: Convergence::None,
            protocol: ActionProtocol::default(),
            decode_options: DecodeOptions::default(),
        })
    }

    /// Create a factory from a device section
    ///
    /// The device's convergence policy, action protocol and color-mode
    /// strictness become the defaults of the handles built here.
    pub fn from_device_config(
        device: &DeviceConfig,
        cache: Arc<ChannelCache>,
        config: PvConfig,
    ) -> Result<Self> {
        let mut factory = Self::new(device.require_base_name()?, cache, config)?;
        factory.convergence = device.convergence.into();
        factory.protocol = device.protocol;
        factory.decode_options = DecodeOptions {
            strict_color_mode: device.strict_color_mode,
        };
        Ok(factory)
    }

    pub fn base_name(&self) -> &str {
        &self.base
    }

    pub fn config(&self) -> &PvConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ChannelCache> {
        &self.cache
    }

    /// Fully-qualified name for `suffix`
    pub fn name(&self, suffix: &str) -> String {
        format!("{}{}", self.base, suffix)
    }

    fn check(&self, name: &str) {
        if !self.config.check_channels {
            return;
        }
        match self.cache.channel(name) {
            Ok(_) => debug!(pv = name, "Channel check passed"),
            Err(e) => warn!(pv = name, error = %e, "Channel check failed"),
        }
    }

    /// Read/write handle
    pub fn attribute<T: PvData>(&self, suffix: &str) -> Attribute<T> {
        let name = self.name(suffix);
        self.check(&name);
        Attribute::new(name, self.cache.clone(), self.config.default_timeout)
    }

    /// Read-only handle
    pub fn read_only<T: PvData>(&self, suffix: &str) -> ReadOnlyAttribute<T> {
        let name = self.name(suffix);
        self.check(&name);
        ReadOnlyAttribute::new(name, self.cache.clone(), self.config.default_timeout)
    }

    /// Demand/readback pair with an explicit policy
    pub fn demand_readback<T: PvData + Convergent>(
        &self,
        demand_suffix: &str,
        readback_suffix: &str,
        policy: Convergence,
    ) -> DemandReadback<T> {
        DemandReadback::new(
            self.attribute(demand_suffix),
            self.read_only(readback_suffix),
            policy,
        )
    }

    /// Pair `suffix` with `suffix_RBV`, using the device's convergence policy
    pub fn with_rbv<T: PvData + Convergent>(&self, suffix: &str) -> DemandReadback<T> {
        let readback = format!("{}{}", suffix, READBACK_SUFFIX);
        self.demand_readback(suffix, &readback, self.convergence)
    }

    /// Action status labelled with the full name of `suffix`
    pub fn action_status(&self, suffix: &str) -> ActionStatus {
        ActionStatus::new(self.name(suffix))
    }

    /// Acquisition driving `suffix` and watching `suffix_RBV`
    pub fn acquisition(&self, suffix: &str) -> Acquisition {
        let state = format!("{}{}", suffix, READBACK_SUFFIX);
        Acquisition::new(
            self.attribute(suffix),
            self.read_only(&state),
            self.protocol,
            self.config.status_poll_interval,
        )
    }

    /// Image reader for the structured record on `suffix`
    pub fn image(&self, suffix: &str) -> ImageReader {
        let name = self.name(suffix);
        self.check(&name);
        ImageReader::new(name, self.cache.clone(), self.decode_options)
    }

    /// Write a dynamically typed value and wait for the acknowledgement
    ///
    /// For parameter sets whose element types are only known at run time.
    pub fn put_value(&self, suffix: &str, value: PvValue) -> Result<()> {
        let name = self.name(suffix);
        if !value.pv_type().is_writable() {
            return Err(PvError::Configuration(format!(
                "'{}': values of type {:?} cannot be written",
                name,
                value.pv_type()
            )));
        }

        debug!(pv = %name, value = %value, "put_value");
        let (tx, rx) = mpsc::channel();
        let callback: PutCallback = Box::new(move |status| {
            let _ = tx.send(status);
        });
        self.cache.channel(&name)?.put(value, Some(callback))?;

        let timeout = self.config.default_timeout;
        match rx.recv_timeout(timeout) {
            Ok(OpStatus::Normal) => Ok(()),
            Ok(OpStatus::Failed(reason)) => Err(PvError::communication(name, reason)),
            Err(_) => Err(PvError::timeout(name, WaitStage::PutCallback, timeout)),
        }
    }

    /// Read a value as the given element type
    pub fn get_value(&self, suffix: &str, ty: PvType) -> Result<PvValue> {
        self.cache.channel(&self.name(suffix))?.get(ty, None)
    }
}
