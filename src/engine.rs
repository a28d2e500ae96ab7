//! The merge engine: model and decal registries plus the staged merge pipeline.
//!
//! A merge runs decal baking, geometry merging and atlas building in that order.
//! Each stage consumes the previous stage's output by value; the registries are
//! only read, and the last output is replaced only when every stage succeeds.

use crate::atlas::{AtlasBuilder, AtlasMode, AtlasOptions, AtlasResult, MaterialOverrides};
use crate::codec::{ImageCodec, ModelDecoder, ModelEncoder, PngCodec};
use crate::decal::{bake_decals, BakeOptions, DecalInstance, DecalOptions, DecalStore, DecalTransform};
use crate::error::{MergeError, Result};
use crate::export::GlbEncoder;
use crate::geometry::Geometry;
use crate::import::GlbDecoder;
use crate::material::{MaterialRecord, TextureChannel};
use crate::merge::{merge_models, MaterialMapping};
use crate::model::{ModelAsset, ModelInfo, ModelScene, ModelStore};
use crate::texture::{Resample, TextureData, MAX_TEXTURE_SIZE};
use crate::types::{BoundingBox, DecalId, ModelId, Transform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Pipeline checkpoints reported to a [`ProgressSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MergeStage {
    BakeDecals,
    MergeGeometry,
    BuildAtlas,
    Assemble,
    Complete,
}

impl MergeStage {
    /// Overall progress at the start of this stage.
    pub fn fraction(self) -> f32 {
        match self {
            MergeStage::BakeDecals => 0.0,
            MergeStage::MergeGeometry => 0.25,
            MergeStage::BuildAtlas => 0.5,
            MergeStage::Assemble => 0.9,
            MergeStage::Complete => 1.0,
        }
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStage::BakeDecals => "bake decals",
            MergeStage::MergeGeometry => "merge geometry",
            MergeStage::BuildAtlas => "build atlas",
            MergeStage::Assemble => "assemble",
            MergeStage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Receives merge progress. Called synchronously; a panic is caught and logged.
pub trait ProgressSink {
    fn on_progress(&mut self, stage: MergeStage, fraction: f32);
}

impl<F: FnMut(MergeStage, f32)> ProgressSink for F {
    fn on_progress(&mut self, stage: MergeStage, fraction: f32) {
        self(stage, fraction)
    }
}

/// Options for a single merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MergeOptions {
    /// Edge length of the square atlas in pixels.
    pub atlas_size: u32,
    /// 0-1; below 0.5 textures are resampled with nearest-neighbour filtering.
    pub texture_quality: f32,
    pub atlas_mode: AtlasMode,
    pub material_overrides: MaterialOverrides,
    /// Decal bake resolution `[width, height]`. Defaults to each albedo's own size.
    pub bake_size: Option<[u32; 2]>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            atlas_size: 2048,
            texture_quality: 0.9,
            atlas_mode: AtlasMode::default(),
            material_overrides: MaterialOverrides::default(),
            bake_size: None,
        }
    }
}

impl MergeOptions {
    /// Parse options from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.atlas_size == 0 {
            return Err(MergeError::InvalidOptions("atlasSize must be positive".to_string()));
        }
        if self.atlas_size > MAX_TEXTURE_SIZE {
            return Err(MergeError::InvalidOptions(format!(
                "atlasSize must be at most {}, got {}",
                MAX_TEXTURE_SIZE, self.atlas_size
            )));
        }
        if !(0.0..=1.0).contains(&self.texture_quality) {
            return Err(MergeError::InvalidOptions(format!(
                "textureQuality must be within [0, 1], got {}",
                self.texture_quality
            )));
        }
        if let Some([w, h]) = self.bake_size {
            if w == 0 || h == 0 {
                return Err(MergeError::InvalidOptions("bakeSize must be positive".to_string()));
            }
            if w > MAX_TEXTURE_SIZE || h > MAX_TEXTURE_SIZE {
                return Err(MergeError::InvalidOptions(format!(
                    "bakeSize must be at most {} per side, got [{}, {}]",
                    MAX_TEXTURE_SIZE, w, h
                )));
            }
        }
        Ok(())
    }

    pub fn atlas_options(&self) -> AtlasOptions {
        AtlasOptions {
            atlas_size: self.atlas_size,
            resample: Resample::from_quality(self.texture_quality),
            mode: self.atlas_mode,
            overrides: self.material_overrides.clone(),
        }
    }

    pub fn bake_options(&self) -> BakeOptions {
        BakeOptions {
            target_size: self.bake_size.map(|[w, h]| (w, h)),
        }
    }
}

/// Result of a successful merge.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    /// Non-indexed merged geometry with atlas UVs, in world space.
    pub geometry: Geometry,
    /// The single merged material.
    pub material: MaterialRecord,
    pub mapping: MaterialMapping,
    pub atlas: AtlasResult,
    pub bounds: BoundingBox,
}

/// Merges registered models (with their decals baked in) into one mesh and material.
pub struct ModelMerger {
    models: ModelStore,
    decals: DecalStore,
    decoder: Box<dyn ModelDecoder>,
    encoder: Box<dyn ModelEncoder>,
    images: Box<dyn ImageCodec>,
    progress: Option<Box<dyn ProgressSink>>,
    last_output: Option<MergeOutput>,
}

impl Default for ModelMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelMerger {
    /// Create a merger using the GLB decoder/encoder and the PNG image codec.
    pub fn new() -> Self {
        Self::with_codecs(Box::new(GlbDecoder), Box::new(GlbEncoder), Box::new(PngCodec))
    }

    pub fn with_codecs(
        decoder: Box<dyn ModelDecoder>,
        encoder: Box<dyn ModelEncoder>,
        images: Box<dyn ImageCodec>,
    ) -> Self {
        Self {
            models: ModelStore::new(),
            decals: DecalStore::new(),
            decoder,
            encoder,
            images,
            progress: None,
            last_output: None,
        }
    }

    /// Decode a model file and register it.
    pub fn add_model(&mut self, name: impl Into<String>, bytes: &[u8], transform: Transform) -> Result<ModelId> {
        let scene = self.decoder.decode(bytes).map_err(MergeError::AssetLoad)?;
        Ok(self.add_model_scene(name, scene, transform))
    }

    /// Register an already decoded scene.
    pub fn add_model_scene(&mut self, name: impl Into<String>, scene: ModelScene, transform: Transform) -> ModelId {
        let name = name.into();
        log::debug!(
            "Adding model '{}': {} meshes, {} materials",
            name,
            scene.meshes.len(),
            scene.materials.len()
        );
        self.models.add(name, scene, transform)
    }

    pub fn update_transform(&mut self, id: ModelId, transform: Transform) -> Result<()> {
        self.models.update_transform(id, transform)
    }

    /// Unregister a model. Decals targeting it stay registered and are skipped by
    /// later merges; see [`ModelMerger::remove_model_and_decals`].
    pub fn remove_model(&mut self, id: ModelId) -> Result<()> {
        self.models.remove(id).map(|_| ())
    }

    /// Unregister a model together with every decal targeting it.
    pub fn remove_model_and_decals(&mut self, id: ModelId) -> Result<usize> {
        self.models.remove(id)?;
        Ok(self.decals.remove_for_model(id))
    }

    pub fn list_models(&self) -> Vec<ModelInfo> {
        self.models.list()
    }

    pub fn model(&self, id: ModelId) -> Option<&ModelAsset> {
        self.models.get(id)
    }

    pub fn add_decal(&mut self, target: ModelId, image: TextureData, options: DecalOptions) -> Result<DecalId> {
        self.decals.add(&self.models, target, Arc::new(image), options)
    }

    /// Decode a decal image with the image codec and register the decal.
    pub fn add_decal_from_bytes(&mut self, target: ModelId, bytes: &[u8], options: DecalOptions) -> Result<DecalId> {
        if !self.models.contains(target) {
            return Err(MergeError::UnknownTarget(target));
        }
        let image = self.images.decode_image(bytes).map_err(MergeError::ImageCodec)?;
        self.add_decal(target, image, options)
    }

    pub fn update_decal_transform(&mut self, id: DecalId, update: DecalTransform) -> Result<()> {
        self.decals.update_transform(id, update)
    }

    pub fn update_decal_opacity(&mut self, id: DecalId, opacity: f32) -> Result<()> {
        self.decals.update_opacity(id, opacity)
    }

    pub fn remove_decal(&mut self, id: DecalId) -> Result<()> {
        self.decals.remove(id).map(|_| ())
    }

    pub fn decal(&self, id: DecalId) -> Option<&DecalInstance> {
        self.decals.get(id)
    }

    pub fn list_decals(&self) -> Vec<&DecalInstance> {
        self.decals.list()
    }

    pub fn decals_for_model(&self, model: ModelId) -> Vec<&DecalInstance> {
        self.decals.list_for_model(model)
    }

    /// Install a progress sink, replacing any previous one.
    pub fn set_progress_callback(&mut self, sink: impl ProgressSink + 'static) {
        self.progress = Some(Box::new(sink));
    }

    pub fn clear_progress_callback(&mut self) {
        self.progress = None;
    }

    /// Run the full pipeline over every registered model.
    pub fn merge(&mut self, options: &MergeOptions) -> Result<&MergeOutput> {
        options.validate()?;

        self.report(MergeStage::BakeDecals);
        let working = bake_decals(self.models.iter(), &self.decals, &options.bake_options())?;

        self.report(MergeStage::MergeGeometry);
        let mut merged = merge_models(&working)?;

        self.report(MergeStage::BuildAtlas);
        let atlas = AtlasBuilder::new(options.atlas_options()).build(&mut merged)?;

        self.report(MergeStage::Assemble);
        let bounds = merged
            .bounds()
            .unwrap_or(BoundingBox::new([0.0; 3], [0.0; 3]));
        let output = MergeOutput {
            geometry: merged.geometry,
            material: atlas.material.clone(),
            mapping: merged.mapping,
            atlas,
            bounds,
        };
        log::debug!(
            "Merged {} models into {} triangles, {} atlas channel(s)",
            working.len(),
            output.geometry.triangle_count(),
            output.atlas.textures.len()
        );

        self.report(MergeStage::Complete);
        Ok(&*self.last_output.insert(output))
    }

    pub fn last_output(&self) -> Option<&MergeOutput> {
        self.last_output.as_ref()
    }

    /// Encode the last merge result with the model encoder.
    pub fn export(&self) -> Result<Vec<u8>> {
        let output = self.last_output.as_ref().ok_or(MergeError::NothingToExport)?;
        self.encoder
            .encode(&output.geometry, &output.material)
            .map_err(MergeError::Export)
    }

    /// Encode one channel atlas of the last merge result with the image codec.
    pub fn encode_atlas(&self, channel: TextureChannel) -> Result<Vec<u8>> {
        let output = self.last_output.as_ref().ok_or(MergeError::NothingToExport)?;
        let texture = output
            .atlas
            .texture(channel)
            .ok_or_else(|| MergeError::AtlasBuild(format!("no {} atlas was built", channel)))?;
        self.images.encode_pixels(texture).map_err(MergeError::ImageCodec)
    }

    /// Drop every model, decal and the last merge result.
    pub fn clear(&mut self) {
        self.models.clear();
        self.decals.clear();
        self.last_output = None;
    }

    fn report(&mut self, stage: MergeStage) {
        log::debug!("Merge stage: {}", stage);
        let Some(sink) = self.progress.as_mut() else {
            return;
        };
        let fraction = stage.fraction();
        let result = panic::catch_unwind(AssertUnwindSafe(|| sink.on_progress(stage, fraction)));
        if result.is_err() {
            log::warn!("Progress callback panicked at stage '{}', continuing", stage);
        }
    }
}
