//! Pluggable asset codecs.
//!
//! The merge engine never parses or serializes files itself; it goes through
//! these traits. Implementations report failures as [`BoxError`], which the
//! engine wraps into the matching [`MergeError`](crate::MergeError) variant.

use crate::error::BoxError;
use crate::geometry::Geometry;
use crate::material::MaterialRecord;
use crate::model::ModelScene;
use crate::texture::{load_texture_from_bytes, TextureData};

/// Decodes a model file into a flattened scene.
pub trait ModelDecoder {
    fn decode(&self, bytes: &[u8]) -> std::result::Result<ModelScene, BoxError>;
}

/// Encodes merged geometry and its material into a model file.
pub trait ModelEncoder {
    fn encode(
        &self,
        geometry: &Geometry,
        material: &MaterialRecord,
    ) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Decodes and encodes raster images.
pub trait ImageCodec {
    fn decode_image(&self, bytes: &[u8]) -> std::result::Result<TextureData, BoxError>;
    fn encode_pixels(&self, texture: &TextureData) -> std::result::Result<Vec<u8>, BoxError>;
}

/// PNG output, any format the `image` crate was built with on input.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn decode_image(&self, bytes: &[u8]) -> std::result::Result<TextureData, BoxError> {
        Ok(load_texture_from_bytes(bytes)?)
    }

    fn encode_pixels(&self, texture: &TextureData) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(texture.to_png()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_codec_round_trip() {
        let codec = PngCodec;
        let texture = TextureData::solid(4, 3, [10, 20, 30, 200]);
        let bytes = codec.encode_pixels(&texture).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(codec.decode_image(&bytes).unwrap(), texture);
    }

    #[test]
    fn test_png_codec_rejects_garbage() {
        assert!(PngCodec.decode_image(b"not an image").is_err());
    }
}
