//! Geometry merge engine.
//!
//! Consolidates the meshes of many models into one non-indexed vertex buffer and
//! records which merged triangles use which source material.

use crate::error::{MergeError, Result};
use crate::geometry::{normalize_attributes, Geometry, POSITION};
use crate::material::MaterialRecord;
use crate::model::ModelAsset;
use crate::types::{BoundingBox, ModelId};
use std::collections::HashMap;
use std::ops::Range;

/// Identity of a source material: the owning model and its material index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialKey {
    pub model: ModelId,
    pub material: usize,
}

/// Ordered mapping from source material to the merged triangles that use it.
///
/// Entry order is first-encountered order; entry `i` corresponds to material `i`
/// of [`MergedGeometry::materials`] and to packed rectangle `i` of the atlas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialMapping {
    keys: Vec<MaterialKey>,
    triangles: Vec<Vec<u32>>,
    lookup: HashMap<MaterialKey, usize>,
}

impl MaterialMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a triangle range for `key`. Returns the entry index and whether the
    /// key was new.
    pub fn insert(&mut self, key: MaterialKey, range: Range<u32>) -> (usize, bool) {
        match self.lookup.get(&key) {
            Some(&index) => {
                self.triangles[index].extend(range);
                (index, false)
            }
            None => {
                let index = self.keys.len();
                self.keys.push(key);
                self.triangles.push(range.collect());
                self.lookup.insert(key, index);
                (index, true)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn index_of(&self, key: &MaterialKey) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    pub fn key(&self, index: usize) -> Option<&MaterialKey> {
        self.keys.get(index)
    }

    /// Merged triangle indices of entry `index`.
    pub fn triangles(&self, index: usize) -> &[u32] {
        self.triangles.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MaterialKey, &[u32])> {
        self.keys
            .iter()
            .zip(self.triangles.iter().map(Vec::as_slice))
    }

    /// Entry index owning merged triangle `triangle`.
    pub fn material_of_triangle(&self, triangle: u32) -> Option<usize> {
        self.triangles
            .iter()
            .position(|tris| tris.binary_search(&triangle).is_ok())
    }
}

/// Output of the geometry merge stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedGeometry {
    /// Non-indexed merged geometry in world space.
    pub geometry: Geometry,
    /// Unique source materials, index-aligned with `mapping`.
    pub materials: Vec<MaterialRecord>,
    pub mapping: MaterialMapping,
}

impl MergedGeometry {
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.geometry.bounding_box()
    }
}

/// Merge every mesh of `models` into one buffer.
///
/// Each mesh is expanded to non-indexed triangles and baked with its model's world
/// matrix times its local matrix. Attributes are reconciled with
/// [`normalize_attributes`] before concatenation.
pub fn merge_models(models: &[ModelAsset]) -> Result<MergedGeometry> {
    let mut parts = Vec::new();
    let mut materials = Vec::new();
    let mut mapping = MaterialMapping::new();
    let mut triangle_offset = 0u32;

    for model in models {
        let world = model.world_matrix();

        for mesh in &model.meshes {
            if !mesh.geometry.has_attribute(POSITION) {
                return Err(MergeError::InvalidAttribute(format!(
                    "mesh '{}' of {} has no position attribute",
                    mesh.name, model.id
                )));
            }

            mesh.geometry.validate_item_sizes()?;
            let mut geometry = mesh.geometry.to_non_indexed()?;
            validate_attribute_counts(&geometry, &mesh.name)?;

            let triangles = geometry.triangle_count() as u32;
            if triangles == 0 {
                log::warn!("Skipping mesh '{}' of {}: no triangles", mesh.name, model.id);
                continue;
            }

            geometry.apply_matrix(&(world * mesh.local_matrix));

            let key = MaterialKey {
                model: model.id,
                material: mesh.material,
            };
            let (_, is_new) = mapping.insert(key, triangle_offset..triangle_offset + triangles);
            if is_new {
                let material = match model.material(mesh.material) {
                    Some(material) => material.clone(),
                    None => {
                        log::warn!(
                            "Mesh '{}' of {} references missing material {}, using default",
                            mesh.name,
                            model.id,
                            mesh.material
                        );
                        MaterialRecord::default()
                    }
                };
                materials.push(material);
            }

            triangle_offset += triangles;
            parts.push(geometry);
        }
    }

    if parts.is_empty() {
        return Err(MergeError::NoGeometry);
    }

    normalize_attributes(&mut parts)?;
    let geometry = Geometry::concat(&parts);

    log::debug!(
        "Merged {} meshes into {} triangles with {} materials",
        parts.len(),
        geometry.triangle_count(),
        materials.len()
    );

    Ok(MergedGeometry {
        geometry,
        materials,
        mapping,
    })
}

fn validate_attribute_counts(geometry: &Geometry, mesh_name: &str) -> Result<()> {
    let expected = geometry.vertex_count();
    for (name, attribute) in &geometry.attributes {
        if attribute.count() != expected {
            return Err(MergeError::InvalidAttribute(format!(
                "attribute '{}' of mesh '{}' has {} entries, expected {}",
                name,
                mesh_name,
                attribute.count(),
                expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Attribute, NORMAL, UV};
    use crate::model::{MeshRecord, ModelScene};
    use crate::types::Transform;
    use glam::{Mat4, Vec3};

    fn triangle() -> Geometry {
        Geometry::from_positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
            .with_uvs(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]])
    }

    fn model(id: u64, meshes: usize, transform: Transform) -> ModelAsset {
        let mut scene = ModelScene::new();
        let material = scene.add_material(MaterialRecord::new(format!("mat{}", id)));
        for i in 0..meshes {
            scene.add_mesh(MeshRecord::new(format!("mesh{}", i), triangle(), material));
        }
        ModelAsset::new(ModelId(id), format!("model{}", id), scene, transform)
    }

    #[test]
    fn test_vertex_count_is_three_per_triangle() {
        let models = vec![
            model(1, 1, Transform::default()),
            model(2, 3, Transform::default()),
            model(3, 2, Transform::default()),
        ];
        let merged = merge_models(&models).unwrap();
        assert_eq!(merged.geometry.vertex_count(), 6 * 3);
        assert_eq!(merged.geometry.triangle_count(), 6);
        assert!(merged.geometry.indices.is_none());
    }

    #[test]
    fn test_shared_material_extends_mapping() {
        let models = vec![model(1, 2, Transform::default()), model(2, 1, Transform::default())];
        let merged = merge_models(&models).unwrap();

        assert_eq!(merged.materials.len(), 2);
        assert_eq!(merged.mapping.len(), 2);
        assert_eq!(merged.mapping.triangles(0), &[0, 1]);
        assert_eq!(merged.mapping.triangles(1), &[2]);
        assert_eq!(merged.mapping.key(1).unwrap().model, ModelId(2));
        assert_eq!(merged.mapping.material_of_triangle(2), Some(1));
        assert_eq!(merged.materials[0].name, "mat1");
    }

    #[test]
    fn test_world_and_local_transforms_are_baked() {
        let mut scene = ModelScene::new();
        scene.add_material(MaterialRecord::default());
        scene.add_mesh(
            MeshRecord::new("tri", triangle(), 0)
                .with_local_matrix(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))),
        );
        let asset = ModelAsset::new(ModelId(1), "m", scene, Transform::from_position([5.0, 0.0, 0.0]));

        let merged = merge_models(&[asset]).unwrap();
        let first = merged.geometry.positions().next().unwrap();
        assert_eq!(first, [5.0, 1.0, 0.0]);
    }

    #[test]
    fn test_indexed_meshes_are_expanded() {
        let quad = Geometry::from_positions(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ])
        .with_indices(vec![0, 1, 2, 0, 2, 3]);
        let mut scene = ModelScene::new();
        scene.add_material(MaterialRecord::default());
        scene.add_mesh(MeshRecord::new("quad", quad, 0));
        let asset = ModelAsset::new(ModelId(1), "m", scene, Transform::default());

        let merged = merge_models(&[asset]).unwrap();
        assert_eq!(merged.geometry.vertex_count(), 6);
        // No UVs on the source: zero-filled.
        assert!(merged.geometry.uvs().all(|uv| uv == [0.0, 0.0]));
        assert!(merged.geometry.has_attribute(NORMAL));
    }

    #[test]
    fn test_no_meshes_is_no_geometry() {
        let empty = ModelAsset::new(ModelId(1), "empty", ModelScene::new(), Transform::default());
        assert!(matches!(merge_models(&[empty]), Err(MergeError::NoGeometry)));
        assert!(matches!(merge_models(&[]), Err(MergeError::NoGeometry)));
    }

    #[test]
    fn test_missing_positions_is_invalid_attribute() {
        let mut scene = ModelScene::new();
        scene.add_material(MaterialRecord::default());
        scene.add_mesh(MeshRecord::new(
            "uv-only",
            Geometry::new().with_attribute(UV, Attribute::new(2, vec![0.0; 6])),
            0,
        ));
        let asset = ModelAsset::new(ModelId(1), "m", scene, Transform::default());
        assert!(matches!(
            merge_models(&[asset]),
            Err(MergeError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_two_component_positions_are_invalid_attribute() {
        let mut scene = ModelScene::new();
        scene.add_material(MaterialRecord::default());
        scene.add_mesh(MeshRecord::new(
            "flat",
            Geometry::new().with_attribute(POSITION, Attribute::new(2, vec![0.0; 6])),
            0,
        ));
        let asset = ModelAsset::new(ModelId(1), "m", scene, Transform::default());
        assert!(matches!(
            merge_models(&[asset]),
            Err(MergeError::InvalidAttribute(_))
        ));

        let mut scene = ModelScene::new();
        scene.add_material(MaterialRecord::default());
        scene.add_mesh(MeshRecord::new(
            "wide-uvs",
            Geometry::from_positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
                .with_attribute(UV, Attribute::new(3, vec![0.0; 9])),
            0,
        ));
        let asset = ModelAsset::new(ModelId(2), "m", scene, Transform::default());
        assert!(matches!(
            merge_models(&[asset]),
            Err(MergeError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_meshes_without_triangles_are_skipped() {
        let mut scene = ModelScene::new();
        let material = scene.add_material(MaterialRecord::new("line"));
        scene.add_mesh(MeshRecord::new(
            "line",
            Geometry::from_positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]),
            material,
        ));
        let degenerate = ModelAsset::new(ModelId(1), "line", scene, Transform::default());

        let models = vec![degenerate, model(2, 1, Transform::default())];
        let merged = merge_models(&models).unwrap();
        assert_eq!(merged.geometry.triangle_count(), 1);
        assert_eq!(merged.mapping.len(), 1);
        assert_eq!(merged.mapping.key(0).unwrap().model, ModelId(2));
        assert_eq!(merged.materials.len(), 1);
        assert_eq!(merged.materials[0].name, "mat2");
    }
}
