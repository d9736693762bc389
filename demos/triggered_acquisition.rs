//! Triggered acquisition against a simulated detector
//!
//! Configures a detector from TOML, sets the exposure through a
//! demand/readback pair, triggers a few frames and decodes each image the
//! detector publishes.
//!
//! ```bash
//! RUST_LOG=info cargo run --example triggered_acquisition
//! ```

use pvlink::config::{DeviceConfig, PvConfig};
use pvlink::io::{ChannelCache, LoopbackTransport, PutBehavior};
use pvlink::protocol::image::ImageBuffer;
use pvlink::protocol::record::{ImageRecord, ScalarArray};
use pvlink::protocol::value::PvValue;
use pvlink::pv::{ActionState, PvFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEVICE: &str = r#"
base_name = "BL13I-EA-DET-01:CAM:"
protocol = "trigger"

[convergence]
mode = "wait_until_equal_within"
timeout = "2s"
"#;

const WIDTH: usize = 256;
const HEIGHT: usize = 192;

fn simulated_detector(exposure: Duration) -> LoopbackTransport {
    let transport = LoopbackTransport::new();
    transport.define("BL13I-EA-DET-01:CAM:AcquireTime", PvValue::Double(0.1));
    transport.define("BL13I-EA-DET-01:CAM:AcquireTime_RBV", PvValue::Double(0.1));
    transport.define("BL13I-EA-DET-01:CAM:Acquire", PvValue::Int(0));
    transport.define("BL13I-EA-DET-01:CAM:Acquire_RBV", PvValue::Int(0));
    transport.link_readback(
        "BL13I-EA-DET-01:CAM:AcquireTime",
        "BL13I-EA-DET-01:CAM:AcquireTime_RBV",
        Duration::from_millis(20),
    );
    // The write to Acquire is acknowledged when the exposure ends
    transport.set_put_behavior(
        "BL13I-EA-DET-01:CAM:Acquire",
        PutBehavior::Delayed(exposure),
    );
    transport
}

fn publish_frame(transport: &LoopbackTransport, frame: i32) {
    let pixels: Vec<u16> = (0..WIDTH * HEIGHT)
        .map(|i| ((i + frame as usize * 97) % 4096) as u16)
        .collect();
    let record = ImageRecord::new(ScalarArray::UShort(pixels), &[WIDTH as i32, HEIGHT as i32])
        .with_color_mode(0)
        .with_unique_id(frame);
    transport.set_record("BL13I-EA-DET-01:CAM:Pva1:Image", record);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let exposure = Duration::from_millis(100);
    let transport = simulated_detector(exposure);
    let cache = Arc::new(ChannelCache::new(Arc::new(transport.clone())));

    let device = DeviceConfig::from_toml_str(DEVICE)?;
    let factory = PvFactory::from_device_config(&device, cache, PvConfig::default())?;

    let acquire_time = factory.with_rbv::<f64>("AcquireTime");
    acquire_time.put(exposure.as_secs_f64())?;
    info!(exposure = acquire_time.get()?, "Exposure set");

    let acquisition = factory.acquisition("Acquire");
    let image = factory.image("Pva1:Image");

    for frame in 1..=3 {
        match acquisition.start_and_wait(Duration::from_secs(5))? {
            ActionState::Fault => {
                warn!(frame, "Acquisition failed");
                continue;
            }
            state => info!(frame, %state, "Acquisition finished"),
        }

        publish_frame(&transport, frame);
        let decoded = image.read()?;
        if let ImageBuffer::UShort(pixels) = &decoded.buffer {
            let max = pixels.iter().copied().max().unwrap_or(0);
            info!(
                unique_id = decoded.unique_id,
                width = decoded.width,
                height = decoded.height,
                max,
                "Frame decoded"
            );
        }
    }

    Ok(())
}
