//! Image source reader
//!
//! Fetches one structured record from an image channel and decodes it.

use crate::error::Result;
use crate::io::cache::ChannelCache;
use crate::protocol::image::{decode_with_options, DecodeOptions, DecodedImage};
use crate::protocol::record::ImageRecord;
use std::sync::Arc;
use tracing::debug;

/// Reader for one image channel
#[derive(Debug, Clone)]
pub struct ImageReader {
    name: String,
    cache: Arc<ChannelCache>,
    options: DecodeOptions,
}

impl ImageReader {
    pub fn new(name: impl Into<String>, cache: Arc<ChannelCache>, options: DecodeOptions) -> Self {
        Self {
            name: name.into(),
            cache,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// The current record snapshot, undecoded
    pub fn read_record(&self) -> Result<ImageRecord> {
        self.cache.channel(&self.name)?.read_record()
    }

    /// Fetch the current record and decode it
    pub fn read(&self) -> Result<DecodedImage> {
        let record = self.read_record()?;
        let image = decode_with_options(&record, self.options)?;
        debug!(
            pv = %self.name,
            unique_id = image.unique_id,
            width = image.width,
            height = image.height,
            channels = image.channels,
            "Image read"
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeFailure, PvError};
    use crate::io::loopback::LoopbackTransport;
    use crate::protocol::image::ImageBuffer;
    use crate::protocol::record::{Codec, ScalarArray};

    fn reader(transport: &LoopbackTransport, options: DecodeOptions) -> ImageReader {
        let cache = Arc::new(ChannelCache::new(Arc::new(transport.clone())));
        ImageReader::new("BL:IMAGE:Pva1:Image", cache, options)
    }

    #[test]
    fn test_read_decodes_current_record() {
        let transport = LoopbackTransport::new();
        transport.set_record(
            "BL:IMAGE:Pva1:Image",
            ImageRecord::new(ScalarArray::UShort(vec![3; 12]), &[4, 3]).with_unique_id(1),
        );
        let reader = reader(&transport, DecodeOptions::default());

        let image = reader.read().unwrap();
        assert_eq!((image.width, image.height), (4, 3));
        assert_eq!(image.buffer, ImageBuffer::UShort(vec![3; 12]));

        transport.set_record(
            "BL:IMAGE:Pva1:Image",
            ImageRecord::new(ScalarArray::UShort(vec![5; 6]), &[3, 2]).with_unique_id(2),
        );
        assert_eq!(reader.read().unwrap().unique_id, 2);
    }

    #[test]
    fn test_read_propagates_decode_failure() {
        let transport = LoopbackTransport::new();
        transport.set_record(
            "BL:IMAGE:Pva1:Image",
            ImageRecord::new(ScalarArray::UByte(vec![0; 12]), &[4, 3]).with_codec(Codec::named("lz4")),
        );
        let reader = reader(&transport, DecodeOptions::default());

        assert!(matches!(
            reader.read(),
            Err(PvError::Decode(DecodeFailure::UnsupportedCodec { .. }))
        ));
        assert!(reader.read_record().is_ok());
    }

    #[test]
    fn test_strict_reader() {
        let transport = LoopbackTransport::new();
        transport.set_record(
            "BL:IMAGE:Pva1:Image",
            ImageRecord::new(ScalarArray::UByte(vec![0; 24]), &[4, 3, 2]).with_color_mode(5),
        );

        assert!(reader(&transport, DecodeOptions::default()).read().is_ok());
        assert!(matches!(
            reader(&transport, DecodeOptions::strict()).read(),
            Err(PvError::Decode(DecodeFailure::UnsupportedColorMode { code: 5 }))
        ));
    }
}
