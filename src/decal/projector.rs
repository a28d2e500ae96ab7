//! Surface point to UV projection.
//!
//! Nearest-triangle lookup uses centroid distance as a cheap proxy, then the
//! closest point on the winning triangle is expressed in barycentric weights and
//! used to interpolate the triangle's UVs. Cost is linear in the triangle count.

use super::store::DecalInstance;
use crate::error::Result;
use crate::geometry::{POSITION, UV};
use crate::model::ModelAsset;
use crate::types::BoundingBox;
use glam::{Vec2, Vec3};

/// One triangle of a model surface in model-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceTriangle {
    pub positions: [Vec3; 3],
    pub uvs: [Vec2; 3],
    /// Material index of the owning mesh.
    pub material: usize,
}

impl SurfaceTriangle {
    pub fn centroid(&self) -> Vec3 {
        (self.positions[0] + self.positions[1] + self.positions[2]) / 3.0
    }
}

/// Where a decal lands in texture space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub uv: [f32; 2],
    /// Material whose albedo receives the decal.
    pub material: usize,
}

/// Model-local triangle soup of a model, used for decal placement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSurface {
    pub triangles: Vec<SurfaceTriangle>,
    pub bounds: Option<BoundingBox>,
}

impl ModelSurface {
    /// Collect every mesh triangle with its local matrix applied. The model's world
    /// transform is not applied: decal positions are model-local.
    pub fn from_model(model: &ModelAsset) -> Result<Self> {
        let mut triangles = Vec::new();

        for mesh in &model.meshes {
            if !mesh.geometry.has_attribute(POSITION) {
                continue;
            }
            let geometry = mesh.geometry.to_non_indexed()?;
            let Some(positions) = geometry.attribute(POSITION) else {
                continue;
            };
            let uvs = geometry.attribute(UV).filter(|uv| uv.count() == positions.count());

            for t in 0..positions.count() / 3 {
                let mut tri = SurfaceTriangle {
                    positions: [Vec3::ZERO; 3],
                    uvs: [Vec2::ZERO; 3],
                    material: mesh.material,
                };
                for corner in 0..3 {
                    let p = positions.get(t * 3 + corner);
                    tri.positions[corner] = mesh
                        .local_matrix
                        .transform_point3(Vec3::new(p[0], p[1], p[2]));
                    if let Some(uvs) = uvs {
                        let uv = uvs.get(t * 3 + corner);
                        tri.uvs[corner] = Vec2::new(uv[0], uv[1]);
                    }
                }
                triangles.push(tri);
            }
        }

        let bounds = BoundingBox::from_points(
            triangles
                .iter()
                .flat_map(|t| t.positions.iter().map(|p| p.to_array())),
        );

        Ok(Self { triangles, bounds })
    }

    /// Largest bounding-box extent, or 0 for an empty surface.
    pub fn max_dimension(&self) -> f32 {
        self.bounds.map_or(0.0, |b| b.max_dimension())
    }

    pub fn project(&self, point: Vec3) -> Option<Projection> {
        project_point(&self.triangles, point)
    }
}

/// Project `point` onto the nearest triangle (by centroid) and interpolate its UVs.
pub fn project_point(triangles: &[SurfaceTriangle], point: Vec3) -> Option<Projection> {
    let nearest = triangles.iter().min_by(|a, b| {
        let da = a.centroid().distance_squared(point);
        let db = b.centroid().distance_squared(point);
        da.total_cmp(&db)
    })?;

    let [a, b, c] = nearest.positions;
    let weights = closest_point_barycentric(point, a, b, c);
    let uv = nearest.uvs[0] * weights[0] + nearest.uvs[1] * weights[1] + nearest.uvs[2] * weights[2];

    Some(Projection {
        uv: uv.to_array(),
        material: nearest.material,
    })
}

/// Barycentric weights of the point on triangle `abc` closest to `p`.
///
/// Weights are clamped to [0, 1] and renormalized to sum to 1. Degenerate
/// triangles resolve to vertex `a`.
pub fn closest_point_barycentric(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> [f32; 3] {
    let ab = b - a;
    let ac = c - a;

    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return [1.0, 0.0, 0.0];
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return [0.0, 1.0, 0.0];
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return normalize_weights([1.0 - v, v, 0.0]);
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return [0.0, 0.0, 1.0];
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return normalize_weights([1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && d4 - d3 >= 0.0 && d5 - d6 >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return normalize_weights([0.0, 1.0 - w, w]);
    }

    let denom = va + vb + vc;
    let v = vb / denom;
    let w = vc / denom;
    normalize_weights([1.0 - v - w, v, w])
}

fn normalize_weights(weights: [f32; 3]) -> [f32; 3] {
    let clamped = weights.map(|w| if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 });
    let sum: f32 = clamped.iter().sum();
    if sum <= f32::EPSILON {
        return [1.0, 0.0, 0.0];
    }
    clamped.map(|w| w / sum)
}

/// Find where `decal` lands on `model`.
///
/// A captured UV hint is used verbatim on the model's primary material; otherwise
/// the decal position is projected onto `surface`.
pub fn resolve(decal: &DecalInstance, model: &ModelAsset, surface: &ModelSurface) -> Option<Projection> {
    if let Some(uv) = decal.uv_hint {
        return model.primary_material().map(|material| Projection { uv, material });
    }
    surface.project(Vec3::from(decal.position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::material::MaterialRecord;
    use crate::model::{MeshRecord, ModelScene};
    use crate::texture::TextureData;
    use crate::types::{DecalId, ModelId, Transform};
    use glam::Mat4;
    use std::sync::Arc;

    fn quad_model() -> ModelAsset {
        // Unit quad in the XY plane, UVs follow XY with v pointing down.
        let quad = Geometry::from_positions(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ])
        .with_uvs(&[[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]])
        .with_indices(vec![0, 1, 2, 0, 2, 3]);

        let mut scene = ModelScene::new();
        let material = scene.add_material(MaterialRecord::new("quad"));
        scene.add_mesh(MeshRecord::new("quad", quad, material));
        ModelAsset::new(ModelId(1), "quad", scene, Transform::from_position([100.0, 0.0, 0.0]))
    }

    fn decal(position: [f32; 3], uv_hint: Option<[f32; 2]>) -> DecalInstance {
        DecalInstance {
            id: DecalId(1),
            target: ModelId(1),
            position,
            rotation: [0.0; 3],
            scale: [1.0; 3],
            opacity: 1.0,
            uv_hint,
            image: Arc::new(TextureData::solid(1, 1, [0; 4])),
        }
    }

    #[test]
    fn test_barycentric_inside_and_outside() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);

        let w = closest_point_barycentric(Vec3::new(0.25, 0.25, 1.0), a, b, c);
        assert!((w[0] - 0.5).abs() < 1e-5);
        assert!((w[1] - 0.25).abs() < 1e-5);
        assert!((w[2] - 0.25).abs() < 1e-5);

        // Beyond vertex b.
        assert_eq!(closest_point_barycentric(Vec3::new(3.0, -1.0, 0.0), a, b, c), [0.0, 1.0, 0.0]);

        // Degenerate triangle still yields valid weights.
        let w = closest_point_barycentric(Vec3::ONE, a, a, a);
        assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(w.iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn test_project_interpolates_uv() {
        let surface = ModelSurface::from_model(&quad_model()).unwrap();
        assert_eq!(surface.triangles.len(), 2);

        let projection = surface.project(Vec3::new(0.25, 0.75, 0.5)).unwrap();
        assert!((projection.uv[0] - 0.25).abs() < 1e-5);
        assert!((projection.uv[1] - 0.25).abs() < 1e-5);
        assert_eq!(projection.material, 0);
    }

    #[test]
    fn test_projection_is_idempotent() {
        let surface = ModelSurface::from_model(&quad_model()).unwrap();
        let point = Vec3::new(0.7, 0.2, -0.3);
        let first = surface.project(point).unwrap();
        let second = surface.project(point).unwrap();
        assert!((first.uv[0] - second.uv[0]).abs() < 1e-6);
        assert!((first.uv[1] - second.uv[1]).abs() < 1e-6);
    }

    #[test]
    fn test_surface_uses_local_not_world_space() {
        let mut model = quad_model();
        model.meshes[0].local_matrix = Mat4::from_scale(Vec3::splat(2.0));
        let surface = ModelSurface::from_model(&model).unwrap();
        assert_eq!(surface.max_dimension(), 2.0);
        assert_eq!(surface.bounds.unwrap().min, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_hint_bypasses_projection() {
        let model = quad_model();
        let surface = ModelSurface::from_model(&model).unwrap();
        let projection = resolve(&decal([0.9, 0.9, 0.0], Some([0.1, 0.2])), &model, &surface).unwrap();
        assert_eq!(projection.uv, [0.1, 0.2]);

        let projected = resolve(&decal([0.5, 0.5, 0.0], None), &model, &surface).unwrap();
        assert!((projected.uv[0] - 0.5).abs() < 1e-5);
        assert!((projected.uv[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_empty_surface_projects_nothing() {
        assert!(project_point(&[], Vec3::ZERO).is_none());
    }
}
