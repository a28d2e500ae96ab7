//! Decal registry.

use crate::error::{MergeError, Result};
use crate::model::ModelStore;
use crate::texture::TextureData;
use crate::types::{DecalId, IdGenerator, ModelId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An image placed on a model's surface, baked into its albedo before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct DecalInstance {
    pub id: DecalId,
    pub target: ModelId,
    /// Model-local position of the decal centre.
    pub position: [f32; 3],
    /// Euler rotation in radians. Only `z` (in-plane) affects baking.
    pub rotation: [f32; 3],
    /// Footprint scale in model units.
    pub scale: [f32; 3],
    /// Blend opacity, always within [0, 1].
    pub opacity: f32,
    /// UV captured by a surface pick. Takes precedence over projection.
    pub uv_hint: Option<[f32; 2]>,
    pub image: Arc<TextureData>,
}

/// Placement of a new decal. Unset fields take identity defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecalOptions {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    pub opacity: f32,
    pub uv_hint: Option<[f32; 2]>,
}

impl Default for DecalOptions {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            opacity: 1.0,
            uv_hint: None,
        }
    }
}

/// Partial transform update for an existing decal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecalTransform {
    pub position: Option<[f32; 3]>,
    pub rotation: Option<[f32; 3]>,
    pub scale: Option<[f32; 3]>,
    /// New UV hint. Moving a decal without one drops the old hint.
    pub uv: Option<[f32; 2]>,
}

fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        return 0.0;
    }
    opacity.clamp(0.0, 1.0)
}

/// Arena of decals keyed by id. Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct DecalStore {
    decals: BTreeMap<DecalId, DecalInstance>,
    ids: IdGenerator,
}

impl DecalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decal on `target`, which must be a registered model.
    pub fn add(
        &mut self,
        models: &ModelStore,
        target: ModelId,
        image: Arc<TextureData>,
        options: DecalOptions,
    ) -> Result<DecalId> {
        if !models.contains(target) {
            return Err(MergeError::UnknownTarget(target));
        }

        let id = DecalId(self.ids.next());
        self.decals.insert(
            id,
            DecalInstance {
                id,
                target,
                position: options.position,
                rotation: options.rotation,
                scale: options.scale,
                opacity: clamp_opacity(options.opacity),
                uv_hint: options.uv_hint,
                image,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: DecalId) -> Option<&DecalInstance> {
        self.decals.get(&id)
    }

    fn get_mut(&mut self, id: DecalId) -> Result<&mut DecalInstance> {
        self.decals.get_mut(&id).ok_or(MergeError::DecalNotFound(id))
    }

    pub fn update_transform(&mut self, id: DecalId, update: DecalTransform) -> Result<()> {
        let decal = self.get_mut(id)?;
        if let Some(position) = update.position {
            decal.position = position;
            decal.uv_hint = None;
        }
        if let Some(rotation) = update.rotation {
            decal.rotation = rotation;
        }
        if let Some(scale) = update.scale {
            decal.scale = scale;
        }
        if let Some(uv) = update.uv {
            decal.uv_hint = Some(uv);
        }
        Ok(())
    }

    /// Set a decal's opacity, clamped to [0, 1].
    pub fn update_opacity(&mut self, id: DecalId, opacity: f32) -> Result<()> {
        self.get_mut(id)?.opacity = clamp_opacity(opacity);
        Ok(())
    }

    pub fn remove(&mut self, id: DecalId) -> Result<DecalInstance> {
        self.decals.remove(&id).ok_or(MergeError::DecalNotFound(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecalInstance> {
        self.decals.values()
    }

    pub fn list(&self) -> Vec<&DecalInstance> {
        self.iter().collect()
    }

    /// Decals targeting `model`, in insertion order.
    pub fn list_for_model(&self, model: ModelId) -> Vec<&DecalInstance> {
        self.iter().filter(|d| d.target == model).collect()
    }

    /// Remove every decal targeting `model`, returning how many were removed.
    pub fn remove_for_model(&mut self, model: ModelId) -> usize {
        let before = self.decals.len();
        self.decals.retain(|_, d| d.target != model);
        before - self.decals.len()
    }

    pub fn len(&self) -> usize {
        self.decals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decals.is_empty()
    }

    pub fn clear(&mut self) {
        self.decals.clear();
    }
}
