//! Detector-level building blocks
//!
//! Composes attribute handles into acquisition control and image reading.

pub mod acquire;
pub mod image;

pub use acquire::Acquisition;
pub use image::ImageReader;
