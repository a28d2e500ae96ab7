//! Model assets and the model registry.

use crate::error::{MergeError, Result};
use crate::geometry::Geometry;
use crate::material::MaterialRecord;
use crate::types::{IdGenerator, ModelId, Transform};
use glam::Mat4;
use std::collections::BTreeMap;

/// One mesh of a model: geometry, its placement inside the model and its material.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRecord {
    pub name: String,
    pub geometry: Geometry,
    /// Mesh-to-model transform, composed from the source node hierarchy.
    pub local_matrix: Mat4,
    /// Index into the owning model's material list.
    pub material: usize,
}

impl MeshRecord {
    pub fn new(name: impl Into<String>, geometry: Geometry, material: usize) -> Self {
        Self {
            name: name.into(),
            geometry,
            local_matrix: Mat4::IDENTITY,
            material,
        }
    }

    pub fn with_local_matrix(mut self, matrix: Mat4) -> Self {
        self.local_matrix = matrix;
        self
    }
}

/// A decoded model's flattened scene subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelScene {
    pub meshes: Vec<MeshRecord>,
    pub materials: Vec<MaterialRecord>,
}

impl ModelScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a material and return its index.
    pub fn add_material(&mut self, material: MaterialRecord) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_mesh(&mut self, mesh: MeshRecord) {
        self.meshes.push(mesh);
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.geometry.triangle_count()).sum()
    }
}

/// A registered model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    pub id: ModelId,
    pub name: String,
    pub transform: Transform,
    pub meshes: Vec<MeshRecord>,
    pub materials: Vec<MaterialRecord>,
}

impl ModelAsset {
    pub fn new(id: ModelId, name: impl Into<String>, scene: ModelScene, transform: Transform) -> Self {
        Self {
            id,
            name: name.into(),
            transform,
            meshes: scene.meshes,
            materials: scene.materials,
        }
    }

    /// Model-to-world matrix.
    pub fn world_matrix(&self) -> Mat4 {
        self.transform.matrix()
    }

    /// The material decals land on when no surface projection picks one.
    pub fn primary_material(&self) -> Option<usize> {
        self.meshes.first().map(|m| m.material)
    }

    pub fn material(&self, index: usize) -> Option<&MaterialRecord> {
        self.materials.get(index)
    }
}

/// Summary of a registered model, as returned by `list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: ModelId,
    pub name: String,
    pub transform: Transform,
    pub mesh_count: usize,
    pub triangle_count: usize,
}

/// Arena of registered models keyed by id. Iteration follows registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    models: BTreeMap<ModelId, ModelAsset>,
    ids: IdGenerator,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model and return its fresh id.
    pub fn add(&mut self, name: impl Into<String>, scene: ModelScene, transform: Transform) -> ModelId {
        let id = ModelId(self.ids.next());
        self.models.insert(id, ModelAsset::new(id, name, scene, transform));
        id
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    pub fn get(&self, id: ModelId) -> Option<&ModelAsset> {
        self.models.get(&id)
    }

    pub fn update_transform(&mut self, id: ModelId, transform: Transform) -> Result<()> {
        let model = self
            .models
            .get_mut(&id)
            .ok_or(MergeError::ModelNotFound(id))?;
        model.transform = transform;
        Ok(())
    }

    pub fn remove(&mut self, id: ModelId) -> Result<ModelAsset> {
        self.models.remove(&id).ok_or(MergeError::ModelNotFound(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelAsset> {
        self.models.values()
    }

    pub fn list(&self) -> Vec<ModelInfo> {
        self.iter()
            .map(|m| ModelInfo {
                id: m.id,
                name: m.name.clone(),
                transform: m.transform,
                mesh_count: m.meshes.len(),
                triangle_count: m.meshes.iter().map(|mesh| mesh.geometry.triangle_count()).sum(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Remove every model. Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.models.clear();
    }
}
