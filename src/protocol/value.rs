//! Wire value model
//!
//! [`PvValue`] is the closed set of element types a channel can carry, one
//! case per scalar and array type. [`PvData`] maps a Rust type onto one of
//! those cases so that handles can be typed (`Attribute<f64>`,
//! `Attribute<Vec<i32>>`, ...) while the transport only ever sees `PvValue`.
//!
//! Channels convert between compatible element types the way a channel
//! server does when a client asks for a different request type; see
//! [`PvValue::convert`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type requested from or written to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PvType {
    Byte,
    Short,
    Int,
    Float,
    Double,
    String,
    Enum,
    ByteArray,
    ShortArray,
    IntArray,
    FloatArray,
    DoubleArray,
    StringArray,
}

impl PvType {
    /// True for the array element types
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            PvType::ByteArray
                | PvType::ShortArray
                | PvType::IntArray
                | PvType::FloatArray
                | PvType::DoubleArray
                | PvType::StringArray
        )
    }

    /// True if values of this type can be written to a channel
    pub fn is_writable(&self) -> bool {
        !matches!(self, PvType::StringArray)
    }
}

/// A value as carried by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PvValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Float(f32),
    Double(f64),
    String(String),
    /// Index into an enumerated record's state strings
    Enum(u16),
    ByteArray(Vec<i8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
}

impl PvValue {
    /// The element type of this value
    pub fn pv_type(&self) -> PvType {
        match self {
            PvValue::Byte(_) => PvType::Byte,
            PvValue::Short(_) => PvType::Short,
            PvValue::Int(_) => PvType::Int,
            PvValue::Float(_) => PvType::Float,
            PvValue::Double(_) => PvType::Double,
            PvValue::String(_) => PvType::String,
            PvValue::Enum(_) => PvType::Enum,
            PvValue::ByteArray(_) => PvType::ByteArray,
            PvValue::ShortArray(_) => PvType::ShortArray,
            PvValue::IntArray(_) => PvType::IntArray,
            PvValue::FloatArray(_) => PvType::FloatArray,
            PvValue::DoubleArray(_) => PvType::DoubleArray,
            PvValue::StringArray(_) => PvType::StringArray,
        }
    }

    /// Number of elements (1 for scalars)
    pub fn element_count(&self) -> usize {
        match self {
            PvValue::ByteArray(v) => v.len(),
            PvValue::ShortArray(v) => v.len(),
            PvValue::IntArray(v) => v.len(),
            PvValue::FloatArray(v) => v.len(),
            PvValue::DoubleArray(v) => v.len(),
            PvValue::StringArray(v) => v.len(),
            _ => 1,
        }
    }

    /// Keep only the first `count` elements of an array value
    pub fn truncate(self, count: usize) -> Self {
        fn cut<T>(mut v: Vec<T>, count: usize) -> Vec<T> {
            v.truncate(count);
            v
        }
        match self {
            PvValue::ByteArray(v) => PvValue::ByteArray(cut(v, count)),
            PvValue::ShortArray(v) => PvValue::ShortArray(cut(v, count)),
            PvValue::IntArray(v) => PvValue::IntArray(cut(v, count)),
            PvValue::FloatArray(v) => PvValue::FloatArray(cut(v, count)),
            PvValue::DoubleArray(v) => PvValue::DoubleArray(cut(v, count)),
            PvValue::StringArray(v) => PvValue::StringArray(cut(v, count)),
            scalar => scalar,
        }
    }

    /// Scalar numeric content as f64, if this is a numeric scalar
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Byte(v) => Some(*v as f64),
            PvValue::Short(v) => Some(*v as f64),
            PvValue::Int(v) => Some(*v as f64),
            PvValue::Float(v) => Some(*v as f64),
            PvValue::Double(v) => Some(*v),
            PvValue::Enum(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Convert to another element type
    ///
    /// Numeric scalars convert among each other (narrowing saturates and
    /// floats truncate toward zero), any scalar converts to `String`, numeric
    /// strings parse back to numbers, numeric arrays convert element-wise,
    /// and a scalar requested as an array becomes a one-element array.
    /// Returns `None` for combinations a channel server would refuse.
    pub fn convert(&self, target: PvType) -> Option<PvValue> {
        if self.pv_type() == target {
            return Some(self.clone());
        }

        if target == PvType::String {
            return match self {
                PvValue::ByteArray(_)
                | PvValue::ShortArray(_)
                | PvValue::IntArray(_)
                | PvValue::FloatArray(_)
                | PvValue::DoubleArray(_)
                | PvValue::StringArray(_) => None,
                scalar => Some(PvValue::String(scalar.to_string())),
            };
        }

        if let PvValue::String(text) = self {
            let number: f64 = text.trim().parse().ok()?;
            return PvValue::Double(number).convert(target);
        }

        if let Some(number) = self.as_f64() {
            return match target {
                PvType::Byte => Some(PvValue::Byte(number as i8)),
                PvType::Short => Some(PvValue::Short(number as i16)),
                PvType::Int => Some(PvValue::Int(number as i32)),
                PvType::Float => Some(PvValue::Float(number as f32)),
                PvType::Double => Some(PvValue::Double(number)),
                PvType::Enum => {
                    if number >= 0.0 && number <= u16::MAX as f64 {
                        Some(PvValue::Enum(number as u16))
                    } else {
                        None
                    }
                }
                PvType::StringArray => Some(PvValue::StringArray(vec![self.to_string()])),
                array if array.is_array() => {
                    PvValue::DoubleArray(vec![number]).convert(array)
                }
                _ => None,
            };
        }

        let numbers = self.numeric_elements()?;
        match target {
            PvType::ByteArray => Some(PvValue::ByteArray(
                numbers.iter().map(|&n| n as i8).collect(),
            )),
            PvType::ShortArray => Some(PvValue::ShortArray(
                numbers.iter().map(|&n| n as i16).collect(),
            )),
            PvType::IntArray => Some(PvValue::IntArray(
                numbers.iter().map(|&n| n as i32).collect(),
            )),
            PvType::FloatArray => Some(PvValue::FloatArray(
                numbers.iter().map(|&n| n as f32).collect(),
            )),
            PvType::DoubleArray => Some(PvValue::DoubleArray(numbers)),
            PvType::StringArray => Some(PvValue::StringArray(
                numbers.iter().map(|n| n.to_string()).collect(),
            )),
            _ => None,
        }
    }

    fn numeric_elements(&self) -> Option<Vec<f64>> {
        match self {
            PvValue::ByteArray(v) => Some(v.iter().map(|&x| x as f64).collect()),
            PvValue::ShortArray(v) => Some(v.iter().map(|&x| x as f64).collect()),
            PvValue::IntArray(v) => Some(v.iter().map(|&x| x as f64).collect()),
            PvValue::FloatArray(v) => Some(v.iter().map(|&x| x as f64).collect()),
            PvValue::DoubleArray(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvValue::Byte(v) => write!(f, "{}", v),
            PvValue::Short(v) => write!(f, "{}", v),
            PvValue::Int(v) => write!(f, "{}", v),
            PvValue::Float(v) => write!(f, "{}", v),
            PvValue::Double(v) => write!(f, "{}", v),
            PvValue::String(v) => f.write_str(v),
            PvValue::Enum(v) => write!(f, "{}", v),
            PvValue::ByteArray(v) => write!(f, "{:?}", v),
            PvValue::ShortArray(v) => write!(f, "{:?}", v),
            PvValue::IntArray(v) => write!(f, "{:?}", v),
            PvValue::FloatArray(v) => write!(f, "{:?}", v),
            PvValue::DoubleArray(v) => write!(f, "{:?}", v),
            PvValue::StringArray(v) => write!(f, "{:?}", v),
        }
    }
}

/// A Rust type that can be carried by one [`PvValue`] case
///
/// `PV_TYPE` is the element type requested from the channel; `from_value`
/// receives a value of that type (the channel converts) and may still reject
/// it, e.g. an enum index outside a Rust enum's range.
pub trait PvData: Clone + fmt::Debug + Send + Sync + 'static {
    /// Element type used on the wire
    const PV_TYPE: PvType;

    /// Wrap into the wire representation
    fn into_value(self) -> PvValue;

    /// Unwrap from the wire representation
    fn from_value(value: PvValue) -> Option<Self>;
}

macro_rules! impl_pv_data {
    ($ty:ty, $variant:ident) => {
        impl PvData for $ty {
            const PV_TYPE: PvType = PvType::$variant;

            fn into_value(self) -> PvValue {
                PvValue::$variant(self)
            }

            fn from_value(value: PvValue) -> Option<Self> {
                match value {
                    PvValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_pv_data!(i8, Byte);
impl_pv_data!(i16, Short);
impl_pv_data!(i32, Int);
impl_pv_data!(f32, Float);
impl_pv_data!(f64, Double);
impl_pv_data!(String, String);
impl_pv_data!(Vec<i8>, ByteArray);
impl_pv_data!(Vec<i16>, ShortArray);
impl_pv_data!(Vec<i32>, IntArray);
impl_pv_data!(Vec<f32>, FloatArray);
impl_pv_data!(Vec<f64>, DoubleArray);
impl_pv_data!(Vec<String>, StringArray);

/// Booleans travel as integers: 0 is false, anything else true
impl PvData for bool {
    const PV_TYPE: PvType = PvType::Int;

    fn into_value(self) -> PvValue {
        PvValue::Int(self as i32)
    }

    fn from_value(value: PvValue) -> Option<Self> {
        match value {
            PvValue::Int(v) => Some(v != 0),
            _ => None,
        }
    }
}

/// Raw index of an enumerated record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumIndex(pub u16);

impl PvData for EnumIndex {
    const PV_TYPE: PvType = PvType::Enum;

    fn into_value(self) -> PvValue {
        PvValue::Enum(self.0)
    }

    fn from_value(value: PvValue) -> Option<Self> {
        match value {
            PvValue::Enum(v) => Some(EnumIndex(v)),
            _ => None,
        }
    }
}

/// A string stored in a byte waveform, NUL-terminated on the wire
///
/// Long strings (file paths, server messages) exceed the 40 character
/// limit of scalar string records and are carried as `char` arrays instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Waveform(pub String);

impl PvData for Waveform {
    const PV_TYPE: PvType = PvType::ByteArray;

    fn into_value(self) -> PvValue {
        let mut bytes: Vec<i8> = self.0.bytes().map(|b| b as i8).collect();
        bytes.push(0);
        PvValue::ByteArray(bytes)
    }

    fn from_value(value: PvValue) -> Option<Self> {
        match value {
            PvValue::ByteArray(v) => {
                let bytes: Vec<u8> = v
                    .into_iter()
                    .map(|b| b as u8)
                    .take_while(|&b| b != 0)
                    .collect();
                Some(Waveform(String::from_utf8_lossy(&bytes).trim().to_string()))
            }
            _ => None,
        }
    }
}
