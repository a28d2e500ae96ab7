//! Mesh geometry types and attribute utilities.
//!
//! Geometry is stored as named, flat `f32` attribute arrays (structure-of-arrays),
//! with an optional index buffer. The merge pipeline always works on non-indexed
//! (triangle-expanded) geometry so that triangle `t` owns vertices `3t..3t + 3`.

use crate::error::{MergeError, Result};
use crate::types::BoundingBox;
use glam::{Mat3, Mat4, Vec3};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the position attribute.
pub const POSITION: &str = "position";
/// Name of the normal attribute.
pub const NORMAL: &str = "normal";
/// Name of the first texture coordinate attribute.
pub const UV: &str = "uv";

/// A flat vertex attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attribute {
    /// Components per vertex (3 for positions, 2 for UVs).
    pub item_size: usize,
    /// Tightly packed component data.
    pub data: Vec<f32>,
}

impl Attribute {
    pub fn new(item_size: usize, data: Vec<f32>) -> Self {
        Self { item_size, data }
    }

    pub fn from_vec3(items: &[[f32; 3]]) -> Self {
        Self::new(3, items.iter().flatten().copied().collect())
    }

    pub fn from_vec2(items: &[[f32; 2]]) -> Self {
        Self::new(2, items.iter().flatten().copied().collect())
    }

    /// Number of vertices stored.
    pub fn count(&self) -> usize {
        if self.item_size == 0 {
            0
        } else {
            self.data.len() / self.item_size
        }
    }

    /// Components of vertex `index`.
    pub fn get(&self, index: usize) -> &[f32] {
        &self.data[index * self.item_size..(index + 1) * self.item_size]
    }

    fn get_vec3(&self, index: usize) -> Vec3 {
        let item = self.get(index);
        Vec3::new(item[0], item[1], item[2])
    }

    fn set_vec3(&mut self, index: usize, value: Vec3) {
        let start = index * self.item_size;
        self.data[start..start + 3].copy_from_slice(&value.to_array());
    }

    /// Gather the given vertices into a new attribute.
    fn gather(&self, indices: &[u32]) -> Result<Attribute> {
        let count = self.count();
        let mut data = Vec::with_capacity(indices.len() * self.item_size);
        for &index in indices {
            let index = index as usize;
            if index >= count {
                return Err(MergeError::InvalidAttribute(format!(
                    "index {} out of range for attribute with {} vertices",
                    index, count
                )));
            }
            data.extend_from_slice(self.get(index));
        }
        Ok(Attribute::new(self.item_size, data))
    }
}

/// A triangle mesh with named attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    /// Vertex attributes by name.
    pub attributes: BTreeMap<String, Attribute>,
    /// Morph target attributes by name. Dropped by [`normalize_attributes`].
    pub morph_attributes: BTreeMap<String, Vec<Attribute>>,
    /// Triangle indices (3 per triangle), or `None` for non-indexed geometry.
    pub indices: Option<Vec<u32>>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build non-indexed geometry from positions, with optional normals and UVs.
    pub fn from_positions(positions: &[[f32; 3]]) -> Self {
        Self::new().with_attribute(POSITION, Attribute::from_vec3(positions))
    }

    pub fn with_attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.set_attribute(name, attribute);
        self
    }

    pub fn with_uvs(self, uvs: &[[f32; 2]]) -> Self {
        self.with_attribute(UV, Attribute::from_vec2(uvs))
    }

    pub fn with_normals(self, normals: &[[f32; 3]]) -> Self {
        self.with_attribute(NORMAL, Attribute::from_vec3(normals))
    }

    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn set_attribute(&mut self, name: &str, attribute: Attribute) {
        self.attributes.insert(name.to_string(), attribute);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.remove(name)
    }

    /// Check the item size of the well-known attributes.
    pub fn validate_item_sizes(&self) -> Result<()> {
        for (name, expected) in [(POSITION, 3), (NORMAL, 3), (UV, 2)] {
            if let Some(attribute) = self.attribute(name) {
                if attribute.item_size != expected {
                    return Err(MergeError::InvalidAttribute(format!(
                        "attribute '{}' has item size {}, expected {}",
                        name, attribute.item_size, expected
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of vertices (taken from the position attribute).
    pub fn vertex_count(&self) -> usize {
        self.attribute(POSITION).map_or(0, Attribute::count)
    }

    /// Number of complete triangles.
    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.vertex_count() / 3,
        }
    }

    /// Check if the geometry has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0
    }

    /// Iterate vertex positions.
    pub fn positions(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.attribute(POSITION)
            .into_iter()
            .flat_map(|a| a.data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]))
    }

    /// Iterate vertex UVs.
    pub fn uvs(&self) -> impl Iterator<Item = [f32; 2]> + '_ {
        self.attribute(UV)
            .into_iter()
            .flat_map(|a| a.data.chunks_exact(2).map(|c| [c[0], c[1]]))
    }

    /// Vertex indices of triangle `t`.
    pub fn triangle(&self, t: usize) -> [usize; 3] {
        match &self.indices {
            Some(indices) => [
                indices[t * 3] as usize,
                indices[t * 3 + 1] as usize,
                indices[t * 3 + 2] as usize,
            ],
            None => [t * 3, t * 3 + 1, t * 3 + 2],
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.positions())
    }

    /// Expand indexed geometry so that every triangle owns three vertices.
    ///
    /// Trailing vertices that do not form a complete triangle are dropped.
    pub fn to_non_indexed(&self) -> Result<Geometry> {
        let indices: Vec<u32> = match &self.indices {
            Some(indices) => indices[..indices.len() - indices.len() % 3].to_vec(),
            None => {
                let complete = self.vertex_count() - self.vertex_count() % 3;
                if complete == self.vertex_count() {
                    return Ok(self.clone());
                }
                (0..complete as u32).collect()
            }
        };

        let mut attributes = BTreeMap::new();
        for (name, attribute) in &self.attributes {
            attributes.insert(name.clone(), attribute.gather(&indices)?);
        }

        let mut morph_attributes = BTreeMap::new();
        for (name, targets) in &self.morph_attributes {
            let expanded = targets
                .iter()
                .map(|target| target.gather(&indices))
                .collect::<Result<Vec<_>>>()?;
            morph_attributes.insert(name.clone(), expanded);
        }

        Ok(Geometry {
            attributes,
            morph_attributes,
            indices: None,
        })
    }

    /// Transform positions by `matrix` and normals by its inverse-transpose.
    pub fn apply_matrix(&mut self, matrix: &Mat4) {
        if let Some(positions) = self.attribute_mut(POSITION).filter(|a| a.item_size >= 3) {
            for i in 0..positions.count() {
                let p = matrix.transform_point3(positions.get_vec3(i));
                positions.set_vec3(i, p);
            }
        }

        let linear = Mat3::from_mat4(*matrix);
        let normal_matrix = if linear.determinant().abs() > f32::EPSILON {
            linear.inverse().transpose()
        } else {
            linear
        };
        if let Some(normals) = self.attribute_mut(NORMAL).filter(|a| a.item_size >= 3) {
            for i in 0..normals.count() {
                let n = (normal_matrix * normals.get_vec3(i)).normalize_or_zero();
                normals.set_vec3(i, n);
            }
        }
    }

    /// Recompute vertex normals by averaging the normals of adjacent faces.
    pub fn compute_vertex_normals(&mut self) {
        let vertex_count = self.vertex_count();
        let mut accumulated = vec![Vec3::ZERO; vertex_count];

        if let Some(positions) = self.attribute(POSITION) {
            for t in 0..self.triangle_count() {
                let [a, b, c] = self.triangle(t);
                if a >= vertex_count || b >= vertex_count || c >= vertex_count {
                    continue;
                }
                let pa = positions.get_vec3(a);
                let pb = positions.get_vec3(b);
                let pc = positions.get_vec3(c);
                // Area-weighted: the cross product length is twice the triangle area.
                let face = (pb - pa).cross(pc - pa);
                accumulated[a] += face;
                accumulated[b] += face;
                accumulated[c] += face;
            }
        }

        let data = accumulated
            .into_iter()
            .flat_map(|n| n.normalize_or_zero().to_array())
            .collect();
        self.set_attribute(NORMAL, Attribute::new(3, data));
    }

    /// Append another non-indexed geometry. Only attributes present in both are kept.
    pub fn merge(&mut self, other: &Geometry) {
        if self.attributes.is_empty() {
            self.attributes = other.attributes.clone();
            return;
        }
        self.attributes.retain(|name, _| other.has_attribute(name));
        for (name, attribute) in self.attributes.iter_mut() {
            if let Some(source) = other.attribute(name) {
                attribute.data.extend_from_slice(&source.data);
            }
        }
    }

    /// Concatenate non-indexed geometries into one buffer.
    pub fn concat(geometries: &[Geometry]) -> Geometry {
        let mut merged = Geometry::new();
        for geometry in geometries {
            merged.merge(geometry);
        }
        merged
    }

    /// Positions as a flat array (for glTF export).
    pub fn positions_flat(&self) -> &[f32] {
        self.attribute(POSITION).map(|a| a.data.as_slice()).unwrap_or(&[])
    }

    /// Normals as a flat array (for glTF export).
    pub fn normals_flat(&self) -> &[f32] {
        self.attribute(NORMAL).map(|a| a.data.as_slice()).unwrap_or(&[])
    }

    /// UVs as a flat array (for glTF export).
    pub fn uvs_flat(&self) -> &[f32] {
        self.attribute(UV).map(|a| a.data.as_slice()).unwrap_or(&[])
    }
}

/// Transform a geometry in place. See [`Geometry::apply_matrix`].
pub fn apply_matrix_to_geometry(geometry: &mut Geometry, matrix: &Mat4) {
    geometry.apply_matrix(matrix);
}

/// Reconcile attributes across geometries that are about to be concatenated.
///
/// Every geometry ends up with `position`, `normal` and `uv` plus only those other
/// attributes that every geometry carries with the same item size. Missing UVs are
/// zero-filled, so all of that geometry's vertices sample the same atlas texel.
/// Missing normals are generated from faces. Morph attributes are discarded.
pub fn normalize_attributes(geometries: &mut [Geometry]) -> Result<()> {
    for (i, geometry) in geometries.iter().enumerate() {
        if !geometry.has_attribute(POSITION) {
            return Err(MergeError::InvalidAttribute(format!(
                "geometry {} has no position attribute",
                i
            )));
        }
    }

    for geometry in geometries.iter_mut() {
        geometry.morph_attributes.clear();

        if !geometry.has_attribute(UV) {
            let count = geometry.vertex_count();
            geometry.set_attribute(UV, Attribute::new(2, vec![0.0; count * 2]));
        }
        if !geometry.has_attribute(NORMAL) {
            geometry.compute_vertex_normals();
        }
    }

    let shared: BTreeSet<String> = match geometries.first() {
        Some(first) => first
            .attributes
            .iter()
            .filter(|(name, attribute)| {
                geometries.iter().all(|g| {
                    g.attribute(name)
                        .is_some_and(|other| other.item_size == attribute.item_size)
                })
            })
            .map(|(name, _)| name.clone())
            .collect(),
        None => return Ok(()),
    };

    for geometry in geometries.iter_mut() {
        geometry.attributes.retain(|name, _| shared.contains(name));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Geometry {
        Geometry::from_positions(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
    }

    #[test]
    fn test_non_indexed_expansion() {
        let quad = Geometry::from_positions(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ])
        .with_uvs(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
        .with_indices(vec![0, 1, 2, 0, 2, 3]);

        let expanded = quad.to_non_indexed().unwrap();
        assert!(expanded.indices.is_none());
        assert_eq!(expanded.vertex_count(), 6);
        assert_eq!(expanded.triangle_count(), 2);
        assert_eq!(expanded.attribute(UV).unwrap().get(5), &[0.0, 1.0]);
    }

    #[test]
    fn test_non_indexed_rejects_bad_index() {
        let broken = unit_triangle().with_indices(vec![0, 1, 7]);
        assert!(matches!(
            broken.to_non_indexed(),
            Err(MergeError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_apply_matrix_transforms_normals_with_inverse_transpose() {
        let mut geometry = Geometry::from_positions(&[[1.0, 1.0, 0.0]])
            .with_normals(&[[1.0, 1.0, 0.0]]);
        let matrix = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        geometry.apply_matrix(&matrix);

        let p = geometry.attribute(POSITION).unwrap().get(0).to_vec();
        assert_eq!(p, vec![2.0, 1.0, 0.0]);

        // A 45 degree normal leans towards Y after stretching X.
        let n = geometry.attribute(NORMAL).unwrap().get(0).to_vec();
        let expected = Vec3::new(0.5, 1.0, 0.0).normalize();
        assert!((n[0] - expected.x).abs() < 1e-5);
        assert!((n[1] - expected.y).abs() < 1e-5);
    }

    #[test]
    fn test_compute_vertex_normals() {
        let mut geometry = unit_triangle();
        geometry.compute_vertex_normals();
        let normals = geometry.attribute(NORMAL).unwrap();
        for i in 0..3 {
            assert_eq!(normals.get(i), &[0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_normalize_fills_uv_and_normal() {
        let mut geometries = vec![unit_triangle()];
        normalize_attributes(&mut geometries).unwrap();

        let g = &geometries[0];
        assert_eq!(g.attribute(UV).unwrap().data, vec![0.0; 6]);
        assert!(g.has_attribute(NORMAL));
    }

    #[test]
    fn test_normalize_keeps_only_shared_attributes() {
        let colored = unit_triangle().with_attribute("color", Attribute::new(4, vec![1.0; 12]));
        let tangent = unit_triangle().with_attribute("tangent", Attribute::new(4, vec![0.0; 12]));
        let mut both = unit_triangle()
            .with_attribute("color", Attribute::new(3, vec![1.0; 9]));
        both.morph_attributes
            .insert(POSITION.to_string(), vec![Attribute::new(3, vec![0.0; 9])]);

        let mut geometries = vec![colored, tangent, both];
        normalize_attributes(&mut geometries).unwrap();

        for g in &geometries {
            let names: Vec<_> = g.attributes.keys().cloned().collect();
            assert_eq!(names, vec!["normal", "position", "uv"]);
            assert!(g.morph_attributes.is_empty());
        }
    }

    #[test]
    fn test_normalize_requires_positions() {
        let mut geometries = vec![unit_triangle(), Geometry::new().with_uvs(&[[0.0, 0.0]])];
        assert!(matches!(
            normalize_attributes(&mut geometries),
            Err(MergeError::InvalidAttribute(_))
        ));
    }

    #[test]
    fn test_concat() {
        let mut a = unit_triangle();
        let mut b = unit_triangle();
        b.apply_matrix(&Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        let mut geometries = vec![a.clone(), b.clone()];
        normalize_attributes(&mut geometries).unwrap();
        a = geometries[0].clone();
        b = geometries[1].clone();

        let merged = Geometry::concat(&[a, b]);
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.triangle_count(), 2);
        assert_eq!(merged.positions().nth(3), Some([2.0, 0.0, 0.0]));
    }
}
