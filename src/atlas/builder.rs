//! Per-channel texture atlas synthesis and UV rewriting.

use super::packer::{fit_to_atlas, pack, PackedRect};
use crate::error::{MergeError, Result};
use crate::geometry::{Geometry, UV};
use crate::material::{MaterialRecord, TextureChannel};
use crate::merge::{MaterialMapping, MergedGeometry};
use crate::texture::{Resample, TextureData, MAX_TEXTURE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Packing box size for materials without an albedo texture.
pub const FALLBACK_TEXTURE_SIZE: u32 = 16;

/// Which channels get an atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtlasMode {
    pub albedo: bool,
    pub normal: bool,
    pub roughness: bool,
    pub metalness: bool,
    pub emissive: bool,
    pub ambient_occlusion: bool,
}

impl Default for AtlasMode {
    fn default() -> Self {
        Self {
            albedo: true,
            normal: false,
            roughness: false,
            metalness: false,
            emissive: false,
            ambient_occlusion: false,
        }
    }
}

impl AtlasMode {
    /// Every channel enabled.
    pub fn all() -> Self {
        Self {
            albedo: true,
            normal: true,
            roughness: true,
            metalness: true,
            emissive: true,
            ambient_occlusion: true,
        }
    }

    pub fn is_enabled(&self, channel: TextureChannel) -> bool {
        match channel {
            TextureChannel::Albedo => self.albedo,
            TextureChannel::Normal => self.normal,
            TextureChannel::Roughness => self.roughness,
            TextureChannel::Metalness => self.metalness,
            TextureChannel::Emissive => self.emissive,
            TextureChannel::AmbientOcclusion => self.ambient_occlusion,
        }
    }

    pub fn enabled_channels(&self) -> Vec<TextureChannel> {
        TextureChannel::ALL
            .into_iter()
            .filter(|&c| self.is_enabled(c))
            .collect()
    }
}

/// Scalar overrides for the merged material. Unset fields use the source mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaterialOverrides {
    pub roughness: Option<f32>,
    pub metalness: Option<f32>,
    pub color: Option<[f32; 3]>,
    pub emissive: Option<[f32; 3]>,
    pub emissive_intensity: Option<f32>,
}

/// Atlas build settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasOptions {
    /// Edge length of the square atlas in pixels.
    pub atlas_size: u32,
    pub resample: Resample,
    pub mode: AtlasMode,
    pub overrides: MaterialOverrides,
}

impl Default for AtlasOptions {
    fn default() -> Self {
        Self {
            atlas_size: 2048,
            resample: Resample::Bilinear,
            mode: AtlasMode::default(),
            overrides: MaterialOverrides::default(),
        }
    }
}

/// A built set of channel atlases sharing one layout.
#[derive(Debug, Clone)]
pub struct AtlasResult {
    pub atlas_size: u32,
    /// Rectangle per source material, index-aligned with the material mapping.
    pub layout: Vec<PackedRect>,
    /// One atlas image per enabled channel.
    pub textures: BTreeMap<TextureChannel, Arc<TextureData>>,
    /// The merged material, with channel maps pointing at the atlases.
    pub material: MaterialRecord,
}

impl AtlasResult {
    pub fn texture(&self, channel: TextureChannel) -> Option<&Arc<TextureData>> {
        self.textures.get(&channel)
    }

    /// Check if any channel atlas was produced.
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Export a channel atlas as PNG bytes.
    pub fn to_png(&self, channel: TextureChannel) -> Result<Vec<u8>> {
        self.texture(channel)
            .ok_or_else(|| MergeError::AtlasBuild(format!("no {} atlas was built", channel)))?
            .to_png()
    }
}

/// Builder for channel atlases over a merged geometry's materials.
pub struct AtlasBuilder {
    options: AtlasOptions,
}

impl AtlasBuilder {
    pub fn new(options: AtlasOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AtlasOptions {
        &self.options
    }

    /// Packing box per material: the albedo texture size or the fallback size.
    pub fn box_sizes(materials: &[MaterialRecord]) -> Vec<(u32, u32)> {
        materials
            .iter()
            .map(|m| match &m.albedo {
                Some(texture) => (texture.width, texture.height),
                None => (FALLBACK_TEXTURE_SIZE, FALLBACK_TEXTURE_SIZE),
            })
            .collect()
    }

    /// Pack the materials and scale the layout to the atlas size.
    pub fn layout(&self, materials: &[MaterialRecord]) -> Vec<PackedRect> {
        fit_to_atlas(&pack(&Self::box_sizes(materials)), self.options.atlas_size)
    }

    /// Build the atlas image of one channel using a precomputed layout.
    pub fn build_channel(
        &self,
        channel: TextureChannel,
        materials: &[MaterialRecord],
        layout: &[PackedRect],
    ) -> Result<TextureData> {
        let size = self.options.atlas_size;
        let mut atlas = TextureData::solid(size, size, [0, 0, 0, 0]);

        for (material, rect) in materials.iter().zip(layout) {
            let resized = match material.texture(channel) {
                Some(texture) => texture.resized(rect.width, rect.height, self.options.resample)?,
                None => {
                    // A solid fill resamples to itself, so synthesize it at the target size.
                    log::debug!(
                        "Material '{}' has no {} texture, using its fallback color",
                        material.name,
                        channel
                    );
                    TextureData::solid_f32(rect.width, rect.height, material.fallback_color(channel))
                }
            };
            atlas.blit(&resized, rect.x, rect.y);
        }

        Ok(atlas)
    }

    /// Build every enabled channel atlas, rewrite the merged UVs and synthesize the
    /// merged material.
    pub fn build(&self, merged: &mut MergedGeometry) -> Result<AtlasResult> {
        if self.options.atlas_size == 0 || self.options.atlas_size > MAX_TEXTURE_SIZE {
            return Err(MergeError::AtlasBuild(format!(
                "atlas size must be within 1..={}, got {}",
                MAX_TEXTURE_SIZE, self.options.atlas_size
            )));
        }
        if merged.materials.len() != merged.mapping.len() {
            return Err(MergeError::AtlasBuild(format!(
                "{} materials but {} mapping entries",
                merged.materials.len(),
                merged.mapping.len()
            )));
        }

        let mut material = synthesize_material(&merged.materials, &self.options.overrides);
        let channels = self.options.mode.enabled_channels();
        if channels.is_empty() {
            log::warn!("All atlas channels disabled; leaving UVs untouched");
            return Ok(AtlasResult {
                atlas_size: self.options.atlas_size,
                layout: Vec::new(),
                textures: BTreeMap::new(),
                material,
            });
        }

        let layout = self.layout(&merged.materials);
        let mut textures = BTreeMap::new();
        for channel in channels {
            let atlas = Arc::new(self.build_channel(channel, &merged.materials, &layout)?);
            material.set_texture(channel, Some(atlas.clone()));
            textures.insert(channel, atlas);
        }

        rewrite_uvs(
            &mut merged.geometry,
            &merged.mapping,
            &layout,
            self.options.atlas_size,
        )?;

        log::debug!(
            "Built {} atlas channel(s) of {}px for {} materials",
            textures.len(),
            self.options.atlas_size,
            layout.len()
        );

        Ok(AtlasResult {
            atlas_size: self.options.atlas_size,
            layout,
            textures,
            material,
        })
    }
}

/// Remap every triangle's UVs into its material's atlas rectangle.
pub fn rewrite_uvs(
    geometry: &mut Geometry,
    mapping: &MaterialMapping,
    layout: &[PackedRect],
    atlas_size: u32,
) -> Result<()> {
    let uvs = geometry
        .attribute_mut(UV)
        .ok_or_else(|| MergeError::InvalidAttribute("merged geometry has no uv attribute".to_string()))?;
    let vertex_count = uvs.count();

    for (index, (_, triangles)) in mapping.iter().enumerate() {
        let rect = layout.get(index).ok_or_else(|| {
            MergeError::AtlasBuild(format!("no packed rectangle for material {}", index))
        })?;
        for &triangle in triangles {
            for vertex in triangle as usize * 3..triangle as usize * 3 + 3 {
                if vertex >= vertex_count {
                    return Err(MergeError::InvalidAttribute(format!(
                        "triangle {} out of range",
                        triangle
                    )));
                }
                let slot = &mut uvs.data[vertex * 2..vertex * 2 + 2];
                let [u, v] = rect.transform_uv([slot[0], slot[1]], atlas_size);
                slot[0] = u;
                slot[1] = v;
            }
        }
    }

    Ok(())
}

/// Merge source material scalars: overrides where given, arithmetic means otherwise.
pub fn synthesize_material(materials: &[MaterialRecord], overrides: &MaterialOverrides) -> MaterialRecord {
    let mut merged = MaterialRecord::new("merged");
    if materials.is_empty() {
        return merged;
    }
    let n = materials.len() as f32;

    let mean = |f: &dyn Fn(&MaterialRecord) -> f32| materials.iter().map(f).sum::<f32>() / n;
    let mean3 = |f: &dyn Fn(&MaterialRecord) -> [f32; 3]| {
        let mut sum = [0.0f32; 3];
        for material in materials {
            let value = f(material);
            for c in 0..3 {
                sum[c] += value[c];
            }
        }
        sum.map(|s| s / n)
    };

    merged.color = overrides.color.unwrap_or_else(|| mean3(&|m| m.color));
    merged.opacity = mean(&|m| m.opacity);
    merged.roughness = overrides.roughness.unwrap_or_else(|| mean(&|m| m.roughness));
    merged.metalness = overrides.metalness.unwrap_or_else(|| mean(&|m| m.metalness));
    merged.emissive = overrides.emissive.unwrap_or_else(|| mean3(&|m| m.emissive));
    merged.emissive_intensity = overrides
        .emissive_intensity
        .unwrap_or_else(|| mean(&|m| m.emissive_intensity));
    merged
}
