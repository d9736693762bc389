//! Error types for process-attribute operations
//!
//! Every public operation in this crate returns `Result<T, PvError>`. The
//! variants map onto the ways an operation against a remote attribute can
//! go wrong: the transport failed, a bounded wait expired, a structured
//! record failed validation, or the handle was set up incorrectly.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which bounded wait expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// Waiting for the remote end to acknowledge a write
    PutCallback,
    /// Waiting for a monitored value to satisfy a predicate
    Value,
    /// The demand write succeeded but the readback never matched it
    Convergence,
    /// Waiting for a triggered action to leave BUSY
    Action,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitStage::PutCallback => "put callback",
            WaitStage::Value => "value",
            WaitStage::Convergence => "readback convergence",
            WaitStage::Action => "action completion",
        };
        f.write_str(s)
    }
}

/// Reason a structured image record was rejected
///
/// The `Display` text is the stable reason string; [`DecodeFailure::reason`]
/// returns the same text without any detail fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The union payload is unset or empty
    #[error("no image data")]
    NoImageData,

    /// The record declares a compression codec
    #[error("unsupported codec")]
    UnsupportedCodec {
        /// Codec name found on the record
        codec: String,
    },

    /// Fewer than two dimensions, or the declared count disagrees with the
    /// populated dimension entries
    #[error("incomplete dimensions")]
    IncompleteDimensions {
        /// Dimension count the producer declared
        declared: usize,
        /// Dimension entries actually populated
        populated: usize,
    },

    /// A dimension size is zero, negative, or the size product overflows
    #[error("invalid dimension size")]
    InvalidDimension {
        /// Offending dimension sizes
        sizes: Vec<i64>,
    },

    /// The color mode attribute is not an integer
    #[error("invalid color mode")]
    InvalidColorMode {
        /// Text of the attribute value
        value: String,
    },

    /// Color mode code outside the known conventions (strict decoding only)
    #[error("unsupported color mode")]
    UnsupportedColorMode {
        /// The code found on the record
        code: i64,
    },

    /// The payload holds fewer elements than width * height * channels
    #[error("buffer too short")]
    BufferTooShort {
        /// Elements required by the geometry
        required: usize,
        /// Elements present in the payload
        available: usize,
    },
}

impl DecodeFailure {
    /// Short reason string, identical to the `Display` output
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeFailure::NoImageData => "no image data",
            DecodeFailure::UnsupportedCodec { .. } => "unsupported codec",
            DecodeFailure::IncompleteDimensions { .. } => "incomplete dimensions",
            DecodeFailure::InvalidDimension { .. } => "invalid dimension size",
            DecodeFailure::InvalidColorMode { .. } => "invalid color mode",
            DecodeFailure::UnsupportedColorMode { .. } => "unsupported color mode",
            DecodeFailure::BufferTooShort { .. } => "buffer too short",
        }
    }
}

/// Process-attribute error types
#[derive(Error, Debug)]
pub enum PvError {
    /// The transport could not be reached or returned something unusable
    ///
    /// This error occurs when:
    /// - The channel for a name cannot be created or is disconnected
    /// - A reply cannot be converted to the handle's value type
    /// - A write completion reports a failed status
    #[error("Communication error on '{pv}': {reason}")]
    Communication {
        /// Attribute name the operation targeted
        pv: String,
        /// Transport-supplied description
        reason: String,
    },

    /// A bounded wait expired
    ///
    /// `stage` tells callers which wait gave up; in particular a
    /// [`WaitStage::Convergence`] timeout means the demand write itself was
    /// accepted but the readback never reflected it.
    #[error("Timed out after {after:?} waiting for {stage} on '{pv}'")]
    Timeout {
        /// Attribute (or action) name
        pv: String,
        /// Which wait expired
        stage: WaitStage,
        /// The timeout that elapsed
        after: Duration,
    },

    /// A structured record failed validation
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeFailure),

    /// A handle or factory was configured incorrectly
    ///
    /// Raised at construction time for a missing name prefix, and for
    /// operations the configured value type cannot support.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operation that must not overlap was started while one is in flight
    #[error("'{pv}' is busy: {reason}")]
    Busy {
        /// Attribute (or action) name
        pv: String,
        /// What is already in flight
        reason: String,
    },
}

impl PvError {
    /// Shorthand for a [`PvError::Communication`]
    pub fn communication(pv: impl Into<String>, reason: impl fmt::Display) -> Self {
        PvError::Communication {
            pv: pv.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a [`PvError::Timeout`]
    pub fn timeout(pv: impl Into<String>, stage: WaitStage, after: Duration) -> Self {
        PvError::Timeout {
            pv: pv.into(),
            stage,
            after,
        }
    }

    /// True for a timeout at the given stage
    pub fn is_timeout_at(&self, expected: WaitStage) -> bool {
        matches!(self, PvError::Timeout { stage, .. } if *stage == expected)
    }
}

/// Result type alias for process-attribute operations
pub type Result<T> = std::result::Result<T, PvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reason_matches_display() {
        let failures = [
            DecodeFailure::NoImageData,
            DecodeFailure::UnsupportedCodec {
                codec: "jpeg".into(),
            },
            DecodeFailure::IncompleteDimensions {
                declared: 3,
                populated: 2,
            },
            DecodeFailure::InvalidDimension { sizes: vec![0, 4] },
            DecodeFailure::InvalidColorMode {
                value: "RGB".into(),
            },
            DecodeFailure::UnsupportedColorMode { code: 9 },
            DecodeFailure::BufferTooShort {
                required: 4,
                available: 3,
            },
        ];
        for failure in failures {
            assert_eq!(failure.to_string(), failure.reason());
        }
    }

    #[test]
    fn test_decode_error_display() {
        let err = PvError::from(DecodeFailure::NoImageData);
        assert_eq!(err.to_string(), "Decode error: no image data");
    }

    #[test]
    fn test_timeout_stage() {
        let err = PvError::timeout("BL:X:RBV", WaitStage::Convergence, Duration::from_secs(1));
        assert!(err.is_timeout_at(WaitStage::Convergence));
        assert!(!err.is_timeout_at(WaitStage::Value));
        assert!(err.to_string().contains("readback convergence"));
    }
}
