//! Built-in codec and factory.
//!
//! Real compression codecs live outside this workspace and are plugged
//! in through [`CodecFactory`]. The pass-through codec here is enough
//! to record and replay raw frames.

use crate::error::CodecError;
use crate::id::CodecId;
use crate::traits::{CodecFactory, FrameCodec};

/// Pass-through codec: frame bytes are stored as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct UncompressedCodec;

impl FrameCodec for UncompressedCodec {
    fn codec_id(&self) -> CodecId {
        CodecId::UNCOMPRESSED
    }

    fn overhead_size(&self, _raw_len: usize) -> usize {
        0
    }

    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
        dst.clear();
        dst.extend_from_slice(src);
        Ok(())
    }

    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
        dst.clear();
        dst.extend_from_slice(src);
        Ok(())
    }
}

/// Factory that only knows [`UncompressedCodec`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCodecFactory;

impl CodecFactory for DefaultCodecFactory {
    fn create(&self, codec: CodecId) -> Option<Box<dyn FrameCodec>> {
        match codec {
            CodecId::UNCOMPRESSED => Some(Box::new(UncompressedCodec)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_is_identity() {
        let mut codec = UncompressedCodec;
        let mut packed = vec![9, 9, 9, 9];
        codec.compress(&[1, 2, 3], &mut packed).unwrap();
        assert_eq!(packed, [1, 2, 3]);
        let mut unpacked = Vec::new();
        codec.decompress(&packed, &mut unpacked).unwrap();
        assert_eq!(unpacked, [1, 2, 3]);
    }

    #[test]
    fn default_factory_only_provides_uncompressed() {
        let factory = DefaultCodecFactory;
        assert!(factory.create(CodecId::UNCOMPRESSED).is_some());
        assert!(factory.create(CodecId::JPEG).is_none());
        assert!(factory.create(CodecId::NULL).is_none());
    }
}
