//! Wire data model
//!
//! This module contains the value types carried by channels and the
//! structured image record together with its decoder.

pub mod image;
pub mod record;
pub mod value;

// Re-export commonly used types
pub use image::{decode, decode_with_options, ColorMode, DecodeOptions, DecodedImage, ImageBuffer};
pub use record::{AttributeValue, Codec, Dimension, ImageRecord, NdAttribute, ScalarArray};
pub use value::{EnumIndex, PvData, PvType, PvValue, Waveform};
