//! Structured image decoder
//!
//! Turns one [`ImageRecord`] into a [`DecodedImage`]: validated geometry plus
//! a freshly allocated, typed pixel buffer.
//!
//! # Channel ordering
//!
//! The position of the color axis among the dimensions depends on the
//! record's `ColorMode` attribute:
//!
//! | Code | Mode | width | height | channels |
//! |------|------|-------|--------|----------|
//! | 0 | mono | d[0] | d[1] | 1 (d[2] ignored) |
//! | 2 | pixel interleaved | d[1] | d[2] | d[0] |
//! | 3 | line interleaved | d[0] | d[2] | d[1] |
//! | 4 | planar | d[0] | d[1] | d[2] |
//!
//! Any other code is read as pixel interleaved unless
//! [`DecodeOptions::strict_color_mode`] is set.
//!
//! # Example
//!
//! ```
//! use pvlink::protocol::image::{decode, ColorMode, ImageBuffer};
//! use pvlink::protocol::record::{ImageRecord, ScalarArray};
//!
//! let record = ImageRecord::new(ScalarArray::UByte(vec![7; 4 * 3 * 2]), &[4, 3, 2])
//!     .with_color_mode(4);
//!
//! let image = decode(&record)?;
//! assert_eq!((image.width, image.height, image.channels), (4, 3, 2));
//! assert_eq!(image.color_mode, ColorMode::Planar);
//! assert!(matches!(image.buffer, ImageBuffer::UByte(ref px) if px.len() == 24));
//! # Ok::<(), pvlink::PvError>(())
//! ```

use crate::error::{DecodeFailure, Result};
use crate::protocol::record::{ImageRecord, ScalarArray};
use tracing::{trace, warn};

/// Channel-ordering convention of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Single channel
    Mono,
    /// Channels fastest: `[c, x, y]`
    PixelInterleaved,
    /// Channels between columns and rows: `[x, c, y]`
    LineInterleaved,
    /// Channels slowest: `[x, y, c]`
    Planar,
}

impl ColorMode {
    /// Wire code of this mode
    pub fn code(&self) -> i64 {
        match self {
            ColorMode::Mono => 0,
            ColorMode::PixelInterleaved => 2,
            ColorMode::LineInterleaved => 3,
            ColorMode::Planar => 4,
        }
    }

    /// Mode for a known wire code
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ColorMode::Mono),
            2 => Some(ColorMode::PixelInterleaved),
            3 => Some(ColorMode::LineInterleaved),
            4 => Some(ColorMode::Planar),
            _ => None,
        }
    }

    /// (width, height, channels) for the given dimension sizes
    ///
    /// `None` if the mode needs a third dimension that is not present.
    fn geometry(&self, d: &[usize]) -> Option<(usize, usize, usize)> {
        match self {
            ColorMode::Mono => Some((d[0], d[1], 1)),
            ColorMode::PixelInterleaved => Some((d[1], *d.get(2)?, d[0])),
            ColorMode::LineInterleaved => Some((d[0], *d.get(2)?, d[1])),
            ColorMode::Planar => Some((d[0], d[1], *d.get(2)?)),
        }
    }
}

/// Decoder behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    /// Reject color-mode codes other than 0, 2, 3 and 4 instead of reading
    /// them as pixel interleaved
    pub strict_color_mode: bool,
}

impl DecodeOptions {
    /// Options that reject unknown color modes
    pub fn strict() -> Self {
        DecodeOptions {
            strict_color_mode: true,
        }
    }
}

/// Extracted pixel data, typed by the record's payload variant
#[derive(Debug, Clone, PartialEq)]
pub enum ImageBuffer {
    Byte(Vec<i8>),
    UByte(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Long(Vec<i64>),
    ULong(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    /// String payloads, and boolean payloads rendered as "true"/"false"
    String(Vec<String>),
}

impl ImageBuffer {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ImageBuffer::Byte(v) => v.len(),
            ImageBuffer::UByte(v) => v.len(),
            ImageBuffer::Short(v) => v.len(),
            ImageBuffer::UShort(v) => v.len(),
            ImageBuffer::Int(v) => v.len(),
            ImageBuffer::UInt(v) => v.len(),
            ImageBuffer::Long(v) => v.len(),
            ImageBuffer::ULong(v) => v.len(),
            ImageBuffer::Float(v) => v.len(),
            ImageBuffer::Double(v) => v.len(),
            ImageBuffer::String(v) => v.len(),
        }
    }

    /// True if the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes of one element (0 for strings)
    pub fn element_size(&self) -> usize {
        match self {
            ImageBuffer::Byte(_) | ImageBuffer::UByte(_) => 1,
            ImageBuffer::Short(_) | ImageBuffer::UShort(_) => 2,
            ImageBuffer::Int(_) | ImageBuffer::UInt(_) | ImageBuffer::Float(_) => 4,
            ImageBuffer::Long(_) | ImageBuffer::ULong(_) | ImageBuffer::Double(_) => 8,
            ImageBuffer::String(_) => 0,
        }
    }

    fn extract(payload: &ScalarArray, count: usize) -> Self {
        match payload {
            ScalarArray::Boolean(v) => {
                ImageBuffer::String(v[..count].iter().map(|b| b.to_string()).collect())
            }
            ScalarArray::Byte(v) => ImageBuffer::Byte(v[..count].to_vec()),
            ScalarArray::UByte(v) => ImageBuffer::UByte(v[..count].to_vec()),
            ScalarArray::Short(v) => ImageBuffer::Short(v[..count].to_vec()),
            ScalarArray::UShort(v) => ImageBuffer::UShort(v[..count].to_vec()),
            ScalarArray::Int(v) => ImageBuffer::Int(v[..count].to_vec()),
            ScalarArray::UInt(v) => ImageBuffer::UInt(v[..count].to_vec()),
            ScalarArray::Long(v) => ImageBuffer::Long(v[..count].to_vec()),
            ScalarArray::ULong(v) => ImageBuffer::ULong(v[..count].to_vec()),
            ScalarArray::Float(v) => ImageBuffer::Float(v[..count].to_vec()),
            ScalarArray::Double(v) => ImageBuffer::Double(v[..count].to_vec()),
            ScalarArray::String(v) => ImageBuffer::String(v[..count].to_vec()),
        }
    }
}

/// A validated image
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    /// Pixels per row
    pub width: usize,
    /// Rows
    pub height: usize,
    /// Channels per pixel
    pub channels: usize,
    /// Convention the geometry was derived with
    pub color_mode: ColorMode,
    /// Producer frame number
    pub unique_id: i32,
    /// Exactly `width * height * channels` elements
    pub buffer: ImageBuffer,
}

impl DecodedImage {
    /// width * height * channels
    pub fn element_count(&self) -> usize {
        self.width * self.height * self.channels
    }
}

/// Decode with default options
pub fn decode(record: &ImageRecord) -> Result<DecodedImage> {
    decode_with_options(record, DecodeOptions::default())
}

/// Validate a record and extract its pixels
pub fn decode_with_options(record: &ImageRecord, options: DecodeOptions) -> Result<DecodedImage> {
    let payload = match &record.value {
        Some(payload) if !payload.is_empty() => payload,
        _ => return Err(DecodeFailure::NoImageData.into()),
    };

    if let Some(codec) = record.codec.as_ref().filter(|c| c.is_compressed()) {
        return Err(DecodeFailure::UnsupportedCodec {
            codec: codec.name.clone(),
        }
        .into());
    }

    let sizes = dimension_sizes(record)?;
    let color_mode = color_mode(record, options)?;

    let (width, height, channels) =
        color_mode
            .geometry(&sizes)
            .ok_or(DecodeFailure::IncompleteDimensions {
                declared: record.dimension_count(),
                populated: sizes.len(),
            })?;

    let required = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| DecodeFailure::InvalidDimension {
            sizes: sizes.iter().map(|&s| s as i64).collect(),
        })?;

    let available = payload.len();
    if available < required {
        return Err(DecodeFailure::BufferTooShort {
            required,
            available,
        }
        .into());
    }

    trace!(
        width,
        height,
        channels,
        payload = payload.type_name(),
        unique_id = record.unique_id,
        "Decoded image geometry"
    );

    Ok(DecodedImage {
        width,
        height,
        channels,
        color_mode,
        unique_id: record.unique_id,
        buffer: ImageBuffer::extract(payload, required),
    })
}

fn dimension_sizes(record: &ImageRecord) -> Result<Vec<usize>> {
    let declared = record.dimension_count();
    let populated: Vec<i32> = record.populated_dimensions().map(|d| d.size).collect();

    if declared != populated.len() || populated.len() < 2 {
        return Err(DecodeFailure::IncompleteDimensions {
            declared,
            populated: populated.len(),
        }
        .into());
    }

    if populated.iter().any(|&s| s <= 0) {
        return Err(DecodeFailure::InvalidDimension {
            sizes: populated.iter().map(|&s| s as i64).collect(),
        }
        .into());
    }

    Ok(populated.into_iter().map(|s| s as usize).collect())
}

fn color_mode(record: &ImageRecord, options: DecodeOptions) -> Result<ColorMode> {
    let code = match record.color_mode_attribute() {
        None => 0,
        Some(value) => value
            .as_integer()
            .ok_or_else(|| DecodeFailure::InvalidColorMode {
                value: value.to_string(),
            })?,
    };

    match ColorMode::from_code(code) {
        Some(mode) => Ok(mode),
        None if options.strict_color_mode => {
            Err(DecodeFailure::UnsupportedColorMode { code }.into())
        }
        None => {
            warn!(
                code,
                "Unrecognised color mode, reading image as pixel interleaved"
            );
            Ok(ColorMode::PixelInterleaved)
        }
    }
}
