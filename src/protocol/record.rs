//! Structured N-dimensional array record
//!
//! An [`ImageRecord`] is one snapshot of a detector image as published on
//! the network: a union-typed value array, a list of dimension descriptors,
//! a list of named attributes and an optional compression codec. Records
//! are produced by the transport and handed to the decoder read-only.
//!
//! # Layout
//!
//! ```text
//! ImageRecord
//!   ├─ value: Option<ScalarArray>      (union: exactly one element type)
//!   ├─ codec: Option<Codec>            (absent or empty name = uncompressed)
//!   ├─ dimension: [Option<Dimension>]  (fastest varying first)
//!   ├─ declared_dimensions: Option<usize>
//!   ├─ attribute: [NdAttribute]        (ColorMode, timestamps, ...)
//!   └─ unique_id, compressed_size, uncompressed_size
//! ```

use serde::{Deserialize, Serialize};

/// Attribute name holding the integer color-mode code
pub const COLOR_MODE_ATTRIBUTE: &str = "ColorMode";

/// Union payload of an image record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarArray {
    Boolean(Vec<bool>),
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
    String(Vec<String>),
}

impl ScalarArray {
    /// Number of elements in the populated variant
    pub fn len(&self) -> usize {
        match self {
            ScalarArray::Boolean(v) => v.len(),
            ScalarArray::Byte(v) => v.len(),
            ScalarArray::UByte(v) => v.len(),
            ScalarArray::Short(v) => v.len(),
            ScalarArray::UShort(v) => v.len(),
            ScalarArray::Int(v) => v.len(),
            ScalarArray::UInt(v) => v.len(),
            ScalarArray::Long(v) => v.len(),
            ScalarArray::ULong(v) => v.len(),
            ScalarArray::Float(v) => v.len(),
            ScalarArray::Double(v) => v.len(),
            ScalarArray::String(v) => v.len(),
        }
    }

    /// True when the populated variant holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Field name of the populated variant as it appears on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarArray::Boolean(_) => "booleanValue",
            ScalarArray::Byte(_) => "byteValue",
            ScalarArray::UByte(_) => "ubyteValue",
            ScalarArray::Short(_) => "shortValue",
            ScalarArray::UShort(_) => "ushortValue",
            ScalarArray::Int(_) => "intValue",
            ScalarArray::UInt(_) => "uintValue",
            ScalarArray::Long(_) => "longValue",
            ScalarArray::ULong(_) => "ulongValue",
            ScalarArray::Float(_) => "floatValue",
            ScalarArray::Double(_) => "doubleValue",
            ScalarArray::String(_) => "stringValue",
        }
    }
}

/// One dimension descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Number of elements along this axis
    pub size: i32,
    /// Offset of this region in the full detector frame
    pub offset: i32,
    /// Size of the full detector frame along this axis
    pub full_size: i32,
    /// Binning applied along this axis
    pub binning: i32,
    /// True if the axis was mirrored
    pub reverse: bool,
}

impl Dimension {
    /// Unbinned, un-offset dimension of the given size
    pub fn new(size: i32) -> Self {
        Dimension {
            size,
            offset: 0,
            full_size: size,
            binning: 1,
            reverse: false,
        }
    }
}

/// Compression codec tag
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Codec {
    /// Codec name; empty means uncompressed
    pub name: String,
}

impl Codec {
    /// Codec with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Codec { name: name.into() }
    }

    /// True when a compression scheme is declared
    pub fn is_compressed(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Value of a named record attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int(i64),
    Double(f64),
    String(String),
}

impl AttributeValue {
    /// Integer content: integers directly, integral doubles, numeric strings
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            AttributeValue::Double(_) => None,
            AttributeValue::String(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Double(v) => write!(f, "{}", v),
            AttributeValue::String(v) => f.write_str(v),
        }
    }
}

/// Named attribute attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdAttribute {
    pub name: String,
    pub value: AttributeValue,
    pub description: String,
    pub source: String,
}

impl NdAttribute {
    /// Attribute with empty description and source
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        NdAttribute {
            name: name.into(),
            value,
            description: String::new(),
            source: String::new(),
        }
    }
}

/// One structured image snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Union payload; `None` when no variant is populated
    pub value: Option<ScalarArray>,
    /// Compression codec, if any
    pub codec: Option<Codec>,
    /// Dimension descriptors; `None` marks an unpopulated element
    pub dimension: Vec<Option<Dimension>>,
    /// Dimension count declared by the producer; defaults to the list length
    pub declared_dimensions: Option<usize>,
    /// Named attributes
    pub attribute: Vec<NdAttribute>,
    /// Producer-assigned frame number
    pub unique_id: i32,
    /// Payload size in bytes as sent
    pub compressed_size: i64,
    /// Payload size in bytes after decompression
    pub uncompressed_size: i64,
}

impl ImageRecord {
    /// Record with the given payload and fully populated dimensions
    ///
    /// ```
    /// use pvlink::protocol::record::{ImageRecord, ScalarArray};
    ///
    /// let record = ImageRecord::new(ScalarArray::UByte(vec![0; 12]), &[4, 3])
    ///     .with_color_mode(0)
    ///     .with_unique_id(7);
    /// assert_eq!(record.dimension_count(), 2);
    /// assert_eq!(record.color_mode_attribute().map(|a| a.as_integer()), Some(Some(0)));
    /// ```
    pub fn new(value: ScalarArray, sizes: &[i32]) -> Self {
        ImageRecord {
            value: Some(value),
            dimension: sizes.iter().map(|&s| Some(Dimension::new(s))).collect(),
            ..Default::default()
        }
    }

    /// Set or replace the `ColorMode` attribute
    pub fn with_color_mode(self, mode: i64) -> Self {
        self.with_attribute(NdAttribute::new(
            COLOR_MODE_ATTRIBUTE,
            AttributeValue::Int(mode),
        ))
    }

    /// Add an attribute, replacing any with the same name
    pub fn with_attribute(mut self, attribute: NdAttribute) -> Self {
        self.attribute.retain(|a| a.name != attribute.name);
        self.attribute.push(attribute);
        self
    }

    /// Declare a compression codec
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set the producer frame number
    pub fn with_unique_id(mut self, id: i32) -> Self {
        self.unique_id = id;
        self
    }

    /// Dimension count the producer declared
    pub fn dimension_count(&self) -> usize {
        self.declared_dimensions.unwrap_or(self.dimension.len())
    }

    /// Populated dimension entries, in order
    pub fn populated_dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimension.iter().flatten()
    }

    /// Attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attribute
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// The `ColorMode` attribute, if present
    pub fn color_mode_attribute(&self) -> Option<&AttributeValue> {
        self.attribute(COLOR_MODE_ATTRIBUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_array_len() {
        assert_eq!(ScalarArray::Double(vec![1.0, 2.0]).len(), 2);
        assert!(ScalarArray::String(vec![]).is_empty());
        assert_eq!(ScalarArray::UShort(vec![1]).type_name(), "ushortValue");
    }

    #[test]
    fn test_codec_whitespace_is_uncompressed() {
        assert!(!Codec::named("  ").is_compressed());
        assert!(Codec::named("lz4").is_compressed());
    }

    #[test]
    fn test_attribute_integer_forms() {
        assert_eq!(AttributeValue::Int(4).as_integer(), Some(4));
        assert_eq!(AttributeValue::Double(2.0).as_integer(), Some(2));
        assert_eq!(AttributeValue::Double(2.5).as_integer(), None);
        assert_eq!(AttributeValue::String(" 3 ".into()).as_integer(), Some(3));
        assert_eq!(AttributeValue::String("RGB1".into()).as_integer(), None);
    }

    #[test]
    fn test_with_attribute_replaces() {
        let record = ImageRecord::new(ScalarArray::Int(vec![1]), &[1, 1])
            .with_color_mode(2)
            .with_color_mode(4);
        assert_eq!(record.attribute.len(), 1);
        assert_eq!(record.color_mode_attribute(), Some(&AttributeValue::Int(4)));
    }

    #[test]
    fn test_populated_dimensions_skip_gaps() {
        let mut record = ImageRecord::new(ScalarArray::Int(vec![1]), &[4, 3]);
        record.dimension.push(None);
        assert_eq!(record.dimension_count(), 3);
        assert_eq!(record.populated_dimensions().count(), 2);
    }
}
