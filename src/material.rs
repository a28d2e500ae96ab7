//! Materials and texture channels.

use crate::texture::TextureData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A texture map slot of a PBR material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextureChannel {
    Albedo,
    Normal,
    Roughness,
    Metalness,
    Emissive,
    AmbientOcclusion,
}

impl TextureChannel {
    /// All channels in atlas build order.
    pub const ALL: [TextureChannel; 6] = [
        TextureChannel::Albedo,
        TextureChannel::Normal,
        TextureChannel::Roughness,
        TextureChannel::Metalness,
        TextureChannel::Emissive,
        TextureChannel::AmbientOcclusion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TextureChannel::Albedo => "albedo",
            TextureChannel::Normal => "normal",
            TextureChannel::Roughness => "roughness",
            TextureChannel::Metalness => "metalness",
            TextureChannel::Emissive => "emissive",
            TextureChannel::AmbientOcclusion => "ao",
        }
    }
}

impl fmt::Display for TextureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A PBR material: optional texture per channel plus scalar fallbacks.
///
/// Textures are shared, so cloning a material never copies pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub name: String,
    pub albedo: Option<Arc<TextureData>>,
    pub normal: Option<Arc<TextureData>>,
    pub roughness_map: Option<Arc<TextureData>>,
    pub metalness_map: Option<Arc<TextureData>>,
    pub emissive_map: Option<Arc<TextureData>>,
    pub ao_map: Option<Arc<TextureData>>,
    /// Base color (linear RGB, 0-1).
    pub color: [f32; 3],
    /// Base alpha (0-1).
    pub opacity: f32,
    pub roughness: f32,
    pub metalness: f32,
    /// Emissive color (linear RGB, 0-1).
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
}

impl Default for MaterialRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            albedo: None,
            normal: None,
            roughness_map: None,
            metalness_map: None,
            emissive_map: None,
            ao_map: None,
            color: [1.0, 1.0, 1.0],
            opacity: 1.0,
            roughness: 1.0,
            metalness: 0.0,
            emissive: [0.0, 0.0, 0.0],
            emissive_intensity: 1.0,
        }
    }
}

impl MaterialRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_albedo(mut self, texture: TextureData) -> Self {
        self.albedo = Some(Arc::new(texture));
        self
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    /// The texture bound to `channel`, if any.
    pub fn texture(&self, channel: TextureChannel) -> Option<&Arc<TextureData>> {
        match channel {
            TextureChannel::Albedo => self.albedo.as_ref(),
            TextureChannel::Normal => self.normal.as_ref(),
            TextureChannel::Roughness => self.roughness_map.as_ref(),
            TextureChannel::Metalness => self.metalness_map.as_ref(),
            TextureChannel::Emissive => self.emissive_map.as_ref(),
            TextureChannel::AmbientOcclusion => self.ao_map.as_ref(),
        }
    }

    /// Bind a texture to `channel`.
    pub fn set_texture(&mut self, channel: TextureChannel, texture: Option<Arc<TextureData>>) {
        let slot = match channel {
            TextureChannel::Albedo => &mut self.albedo,
            TextureChannel::Normal => &mut self.normal,
            TextureChannel::Roughness => &mut self.roughness_map,
            TextureChannel::Metalness => &mut self.metalness_map,
            TextureChannel::Emissive => &mut self.emissive_map,
            TextureChannel::AmbientOcclusion => &mut self.ao_map,
        };
        *slot = texture;
    }

    /// The color a channel falls back to when it has no texture (RGBA, 0-1).
    pub fn fallback_color(&self, channel: TextureChannel) -> [f32; 4] {
        match channel {
            TextureChannel::Albedo => [self.color[0], self.color[1], self.color[2], self.opacity],
            // Flat tangent-space normal.
            TextureChannel::Normal => [0.5, 0.5, 1.0, 1.0],
            TextureChannel::Roughness => [self.roughness, self.roughness, self.roughness, 1.0],
            TextureChannel::Metalness => [self.metalness, self.metalness, self.metalness, 1.0],
            TextureChannel::Emissive => [self.emissive[0], self.emissive[1], self.emissive[2], 1.0],
            TextureChannel::AmbientOcclusion => [1.0, 1.0, 1.0, 1.0],
        }
    }
}
