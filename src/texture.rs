//! RGBA texture data, resampling and compositing.
//!
//! UV convention: texture coordinates use a **top-left** origin, the glTF
//! convention. `v = 0` is image row 0 and `v = 1` is the bottom row. Both the
//! atlas engine and the decal baker convert through [`uv_to_pixel`], so
//! compositing and UV rewriting can never disagree about the v axis.

use crate::error::{MergeError, Result};
use image::{imageops, ImageEncoder, RgbaImage};

/// Largest atlas or bake edge length accepted by the pipeline.
pub const MAX_TEXTURE_SIZE: u32 = 16384;

/// Raw texture data, RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    /// Texture width in pixels.
    pub width: u32,
    /// Texture height in pixels.
    pub height: u32,
    /// RGBA8 pixel data (4 bytes per pixel), row 0 at the top.
    pub pixels: Vec<u8>,
}

/// Resampling filter used when a texture is resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resample {
    Nearest,
    Bilinear,
}

impl Resample {
    /// Pick a filter from a 0-1 quality setting.
    pub fn from_quality(quality: f32) -> Self {
        if quality >= 0.5 {
            Resample::Bilinear
        } else {
            Resample::Nearest
        }
    }

    fn filter(self) -> imageops::FilterType {
        match self {
            Resample::Nearest => imageops::FilterType::Nearest,
            Resample::Bilinear => imageops::FilterType::Triangle,
        }
    }
}

/// Map a UV coordinate to continuous pixel coordinates of a `width` x `height` image.
pub fn uv_to_pixel(uv: [f32; 2], width: u32, height: u32) -> [f32; 2] {
    [uv[0] * width as f32, uv[1] * height as f32]
}

/// Convert a linear 0-1 color to RGBA8.
pub fn color_to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

impl TextureData {
    /// Create a new texture from RGBA data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Create a texture filled with a single color.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixels = color.repeat(width as usize * height as usize);
        Self::new(width, height, pixels)
    }

    /// Create a texture filled with a single 0-1 color.
    pub fn solid_f32(width: u32, height: u32, color: [f32; 4]) -> Self {
        Self::solid(width, height, color_to_rgba8(color))
    }

    /// Check if this texture has transparency.
    pub fn has_transparency(&self) -> bool {
        self.pixels.chunks(4).any(|pixel| pixel[3] < 255)
    }

    fn pixel_offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Get a pixel at (x, y).
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = self.pixel_offset(x, y);
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    /// Set a pixel at (x, y).
    pub fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let idx = self.pixel_offset(x, y);
        self.pixels[idx..idx + 4].copy_from_slice(&color);
    }

    /// Composite `color` over the pixel at (x, y) with the given extra opacity.
    pub fn blend_pixel(&mut self, x: u32, y: u32, color: [u8; 4], opacity: f32) {
        let src_a = color[3] as f32 / 255.0 * opacity.clamp(0.0, 1.0);
        if src_a <= 0.0 {
            return;
        }
        let dst = self.get_pixel(x, y);
        let dst_a = dst[3] as f32 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);

        let mut out = [0u8; 4];
        for c in 0..3 {
            let value = (color[c] as f32 * src_a + dst[c] as f32 * dst_a * (1.0 - src_a)) / out_a;
            out[c] = value.round().clamp(0.0, 255.0) as u8;
        }
        out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        self.put_pixel(x, y, out);
    }

    /// Sample the nearest pixel at a UV coordinate (clamped to the edges).
    pub fn sample_nearest(&self, uv: [f32; 2]) -> [u8; 4] {
        let [x, y] = uv_to_pixel(uv, self.width, self.height);
        let x = (x.floor() as i64).clamp(0, self.width as i64 - 1) as u32;
        let y = (y.floor() as i64).clamp(0, self.height as i64 - 1) as u32;
        self.get_pixel(x, y)
    }

    /// Copy `source` into this texture with its top-left corner at (x, y).
    /// Pixels falling outside the destination are clipped.
    pub fn blit(&mut self, source: &TextureData, x: u32, y: u32) {
        let width = source.width.min(self.width.saturating_sub(x));
        let height = source.height.min(self.height.saturating_sub(y));
        let row_bytes = width as usize * 4;

        for row in 0..height {
            let src_idx = source.pixel_offset(0, row);
            let dst_idx = self.pixel_offset(x, y + row);
            self.pixels[dst_idx..dst_idx + row_bytes]
                .copy_from_slice(&source.pixels[src_idx..src_idx + row_bytes]);
        }
    }

    /// Return a copy resized to `width` x `height`.
    pub fn resized(&self, width: u32, height: u32, resample: Resample) -> Result<TextureData> {
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        let image = self.to_rgba_image()?;
        let resized = imageops::resize(&image, width.max(1), height.max(1), resample.filter());
        Ok(Self::from_rgba_image(resized))
    }

    /// Convert into an `image` buffer.
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            MergeError::AtlasBuild(format!(
                "pixel buffer of {} bytes does not match {}x{} RGBA",
                self.pixels.len(),
                self.width,
                self.height
            ))
        })
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// Export the texture as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let cursor = std::io::Cursor::new(&mut bytes);
        let encoder = image::codecs::png::PngEncoder::new(cursor);

        encoder.write_image(
            &self.pixels,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(bytes)
    }
}

/// Load a texture from encoded image bytes (PNG, JPEG).
pub fn load_texture_from_bytes(data: &[u8]) -> std::result::Result<TextureData, image::ImageError> {
    let img = image::load_from_memory(data)?;
    Ok(TextureData::from_rgba_image(img.to_rgba8()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_pixel() {
        let tex = TextureData::new(2, 2, vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 255]);

        assert_eq!(tex.get_pixel(0, 0), [255, 0, 0, 255]); // Red
        assert_eq!(tex.get_pixel(1, 0), [0, 255, 0, 255]); // Green
        assert_eq!(tex.get_pixel(0, 1), [0, 0, 255, 255]); // Blue
        assert_eq!(tex.get_pixel(1, 1), [255, 255, 255, 255]); // White
    }

    #[test]
    fn test_has_transparency() {
        let opaque = TextureData::new(1, 1, vec![255, 0, 0, 255]);
        assert!(!opaque.has_transparency());

        let transparent = TextureData::new(1, 1, vec![255, 0, 0, 128]);
        assert!(transparent.has_transparency());
    }

    #[test]
    fn test_blit_clips_to_destination() {
        let mut dst = TextureData::solid(4, 4, [0, 0, 0, 255]);
        let src = TextureData::solid(3, 3, [255, 0, 0, 255]);
        dst.blit(&src, 2, 2);

        assert_eq!(dst.get_pixel(1, 1), [0, 0, 0, 255]);
        assert_eq!(dst.get_pixel(2, 2), [255, 0, 0, 255]);
        assert_eq!(dst.get_pixel(3, 3), [255, 0, 0, 255]);
    }

    #[test]
    fn test_blend_pixel() {
        let mut tex = TextureData::solid(1, 1, [0, 0, 255, 255]);
        tex.blend_pixel(0, 0, [255, 0, 0, 255], 0.5);
        assert_eq!(tex.get_pixel(0, 0), [128, 0, 128, 255]);

        tex.blend_pixel(0, 0, [0, 255, 0, 255], 1.0);
        assert_eq!(tex.get_pixel(0, 0), [0, 255, 0, 255]);

        // Fully transparent source leaves the destination alone.
        tex.blend_pixel(0, 0, [255, 255, 255, 0], 1.0);
        assert_eq!(tex.get_pixel(0, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn test_resize_solid_keeps_color() {
        let tex = TextureData::solid(2, 2, [10, 20, 30, 255]);
        for resample in [Resample::Nearest, Resample::Bilinear] {
            let resized = tex.resized(5, 3, resample).unwrap();
            assert_eq!((resized.width, resized.height), (5, 3));
            assert!(resized.pixels.chunks(4).all(|p| p == [10, 20, 30, 255]));
        }
    }

    #[test]
    fn test_uv_origin_is_top_left() {
        let mut tex = TextureData::solid(2, 2, [0, 0, 0, 255]);
        tex.put_pixel(0, 0, [255, 255, 255, 255]);
        assert_eq!(tex.sample_nearest([0.1, 0.1]), [255, 255, 255, 255]);
        assert_eq!(tex.sample_nearest([0.1, 0.9]), [0, 0, 0, 255]);
    }

    #[test]
    fn test_png_round_trip() {
        let tex = TextureData::solid(3, 2, [1, 2, 3, 4]);
        let png = tex.to_png().unwrap();
        let decoded = load_texture_from_bytes(&png).unwrap();
        assert_eq!(decoded, tex);
    }
}
