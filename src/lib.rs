//! Process-attribute handles and detector image decoding in Rust
//!
//! This library mediates between a control program and a remote
//! instrument-control network. It exposes named, typed *process attributes*
//! (scalar or array values hosted by a remote server) as local handles with
//! well-defined write-acknowledgement and change-notification semantics, and
//! it decodes the structured, union-typed record a detector publishes for
//! each image into a flat typed buffer.
//!
//! # Features
//!
//! - **Typed handles** - `Attribute<f64>`, `Attribute<Vec<i32>>`, user enums, booleans
//! - **Confirmed writes** - wait for the remote acknowledgement, or for the readback to converge
//! - **Value waits** - block until a monitored value satisfies a predicate, always with a timeout
//! - **Triggered actions** - IDLE/BUSY/FAULT tracking of write-started remote actions
//! - **Image decoding** - geometry from color-mode conventions, strict validation, typed buffers
//! - **Sync and async** - blocking API with a tokio façade on the blocking pool
//!
//! # Quick Start
//!
//! ## Writing and Reading Attributes
//!
//! ```
//! use pvlink::config::PvConfig;
//! use pvlink::io::{ChannelCache, LoopbackTransport};
//! use pvlink::protocol::value::PvValue;
//! use pvlink::pv::PvFactory;
//! use std::sync::Arc;
//!
//! let transport = LoopbackTransport::new();
//! transport.define("BL:CAM:AcquireTime", PvValue::Double(0.1));
//! transport.define("BL:CAM:AcquireTime_RBV", PvValue::Double(0.1));
//!
//! let cache = Arc::new(ChannelCache::new(Arc::new(transport)));
//! let factory = PvFactory::new("BL:CAM:", cache, PvConfig::default())?;
//!
//! let exposure = factory.with_rbv::<f64>("AcquireTime");
//! exposure.put(0.5)?;
//! let readback = exposure.get()?;
//! # Ok::<(), pvlink::PvError>(())
//! ```
//!
//! ## Triggered Acquisition
//!
//! ```no_run
//! use pvlink::config::{DeviceConfig, PvConfig};
//! use pvlink::io::{ChannelCache, Transport};
//! use pvlink::pv::{ActionState, PvFactory};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn run(transport: Arc<dyn Transport>) -> pvlink::Result<()> {
//! let cache = Arc::new(ChannelCache::new(transport));
//! let device = DeviceConfig::with_base_name("BL13I-EA-DET-01:CAM:");
//! let factory = PvFactory::from_device_config(&device, cache, PvConfig::default())?;
//!
//! let acquisition = factory.acquisition("Acquire");
//! acquisition.start()?;
//! match acquisition.wait_while_busy(Duration::from_secs(30))? {
//!     ActionState::Fault => eprintln!("acquisition failed"),
//!     _ => println!("acquisition complete"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading Images
//!
//! ```no_run
//! use pvlink::protocol::image::ImageBuffer;
//! use pvlink::pv::PvFactory;
//!
//! # fn run(factory: PvFactory) -> pvlink::Result<()> {
//! let image = factory.image("Pva1:Image").read()?;
//! println!("{}x{}x{}", image.width, image.height, image.channels);
//! if let ImageBuffer::UShort(pixels) = &image.buffer {
//!     let max = pixels.iter().max();
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ## Module Structure
//!
//! - **`protocol`** - Wire data model
//!   - `value` - `PvValue`, `PvType` and the `PvData` mapping trait
//!   - `record` - Structured image record (`ImageRecord`)
//!   - `image` - Image decoder (`decode`, `DecodedImage`)
//!
//! - **`io`** - Channel access layer
//!   - `Transport` / `Channel` - Interface to the network collaborator
//!   - `ChannelCache` - Lazily created, per-name channels
//!   - `LoopbackTransport` - In-process transport
//!
//! - **`pv`** - Attribute handles
//!   - `Attribute` / `ReadOnlyAttribute` - Typed handles
//!   - `DemandReadback` - Demand write with readback convergence
//!   - `ActionStatus` - IDLE/BUSY/FAULT status machine
//!   - `PvFactory` - Prefix-based handle construction
//!
//! - **`device`** - Detector building blocks
//!   - `Acquisition` - Trigger and start/stop acquisition control
//!   - `ImageReader` - Fetch and decode image records
//!
//! - **`config`** - `PvConfig`, `DeviceConfig` (TOML)
//!
//! - **`error`** - Error handling
//!   - `PvError` - Unified error type for all operations
//!   - `Result<T>` - Type alias for `Result<T, PvError>`
//!
//! ## Design Principles
//!
//! 1. **Bounded Waits**: Every blocking operation takes a timeout
//! 2. **Injected Transport**: No global channel provider; the cache is passed to every handle
//! 3. **Explicit Error Handling**: Rejected writes, lost acknowledgements and non-convergence are distinct errors
//! 4. **Pure Decoding**: The image decoder is a function over an immutable snapshot
//!
//! # Error Handling
//!
//! All operations return `Result<T, PvError>`:
//!
//! - **Communication** - The channel is unreachable, a reply is unusable or a write was rejected
//! - **Timeout** - A bounded wait expired; the `WaitStage` says which one
//! - **Decode** - An image record failed validation
//! - **Configuration** - A handle or factory was set up incorrectly
//! - **Busy** - An operation that must not overlap was started twice
//!
//! ```no_run
//! use pvlink::error::WaitStage;
//! use pvlink::pv::DemandReadback;
//! use pvlink::PvError;
//!
//! # fn run(temperature: DemandReadback<f64>) {
//! match temperature.put(25.0) {
//!     Ok(()) => println!("At temperature"),
//!     Err(PvError::Timeout { stage: WaitStage::Convergence, .. }) => {
//!         eprintln!("Setpoint accepted but not reached")
//!     }
//!     Err(e) => eprintln!("Write failed: {}", e),
//! }
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod io;
pub mod protocol;
pub mod pv;

// Re-export commonly used types
pub use error::{PvError, Result};
