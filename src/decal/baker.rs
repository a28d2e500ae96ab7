//! Decal compositing onto a model's own albedo textures.
//!
//! Baking runs per model before the merge, against each material's unatlased
//! albedo. The decal footprint in pixels is `scale / surface max extent * image
//! size`, an approximation that ignores varying UV density across the mesh.

use super::projector::{resolve, ModelSurface};
use super::store::{DecalInstance, DecalStore};
use crate::error::Result;
use crate::material::{MaterialRecord, TextureChannel};
use crate::model::ModelAsset;
use crate::texture::{uv_to_pixel, Resample, TextureData};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Bake resolution for materials that have no albedo texture.
pub const DEFAULT_BAKE_SIZE: u32 = 1024;

/// Decal bake settings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BakeOptions {
    /// Destination size. `None` keeps each albedo's native size.
    pub target_size: Option<(u32, u32)>,
}

/// A new albedo image for one material of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct BakedTexture {
    pub material: usize,
    pub texture: TextureData,
    /// Number of decals composited into this texture.
    pub decal_count: usize,
}

/// Where one decal lands in a destination image.
struct Placement<'a> {
    decal: &'a DecalInstance,
    uv: [f32; 2],
}

/// Bake `decals` into the albedo of the materials they land on.
///
/// Decals are composited in the given order, so later decals draw on top.
pub fn bake_model(
    model: &ModelAsset,
    decals: &[&DecalInstance],
    options: &BakeOptions,
) -> Result<Vec<BakedTexture>> {
    if decals.is_empty() {
        return Ok(Vec::new());
    }

    let surface = ModelSurface::from_model(model)?;
    let extent = match surface.max_dimension() {
        d if d > f32::EPSILON => d,
        _ => 1.0,
    };

    let mut by_material: BTreeMap<usize, Vec<Placement>> = BTreeMap::new();
    for &decal in decals {
        match resolve(decal, model, &surface) {
            Some(projection) => by_material
                .entry(projection.material)
                .or_default()
                .push(Placement {
                    decal,
                    uv: projection.uv,
                }),
            None => log::warn!("{} does not land on any surface of {}, skipping", decal.id, model.id),
        }
    }

    let mut baked = Vec::with_capacity(by_material.len());
    for (index, placements) in by_material {
        let Some(material) = model.material(index) else {
            log::warn!("{} has no material {}, skipping its decals", model.id, index);
            continue;
        };

        let mut texture = base_image(material, options)?;
        for placement in &placements {
            let decal = placement.decal;
            let footprint = [
                decal.scale[0] / extent * texture.width as f32,
                decal.scale[1] / extent * texture.height as f32,
            ];
            composite_decal(
                &mut texture,
                &decal.image,
                placement.uv,
                footprint,
                decal.rotation[2],
                decal.opacity,
            );
        }

        log::debug!(
            "Baked {} decal(s) into material {} of {} at {}x{}",
            placements.len(),
            index,
            model.id,
            texture.width,
            texture.height
        );
        baked.push(BakedTexture {
            material: index,
            texture,
            decal_count: placements.len(),
        });
    }

    Ok(baked)
}

fn base_image(material: &MaterialRecord, options: &BakeOptions) -> Result<TextureData> {
    match &material.albedo {
        Some(albedo) => {
            let (width, height) = options.target_size.unwrap_or((albedo.width, albedo.height));
            albedo.resized(width.max(1), height.max(1), Resample::Bilinear)
        }
        None => {
            let (width, height) = options
                .target_size
                .unwrap_or((DEFAULT_BAKE_SIZE, DEFAULT_BAKE_SIZE));
            Ok(TextureData::solid_f32(
                width.max(1),
                height.max(1),
                material.fallback_color(TextureChannel::Albedo),
            ))
        }
    }
}

/// Alpha-blend `image` into `dest` over a `footprint`-sized rectangle (pixels)
/// centred on `center_uv` and rotated in plane by `rotation` radians.
pub fn composite_decal(
    dest: &mut TextureData,
    image: &TextureData,
    center_uv: [f32; 2],
    footprint: [f32; 2],
    rotation: f32,
    opacity: f32,
) {
    let [w, h] = footprint;
    if w <= 0.0 || h <= 0.0 || image.width == 0 || image.height == 0 || opacity <= 0.0 {
        return;
    }

    let [cx, cy] = uv_to_pixel(center_uv, dest.width, dest.height);
    let (sin, cos) = rotation.sin_cos();

    // Axis-aligned bounds of the rotated rectangle.
    let half_x = (w * cos.abs() + h * sin.abs()) / 2.0;
    let half_y = (w * sin.abs() + h * cos.abs()) / 2.0;
    let x0 = (cx - half_x).floor().max(0.0) as u32;
    let y0 = (cy - half_y).floor().max(0.0) as u32;
    let x1 = ((cx + half_x).ceil().max(0.0) as u32).min(dest.width);
    let y1 = ((cy + half_y).ceil().max(0.0) as u32).min(dest.height);

    for y in y0..y1 {
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            // Rotate back into the decal's frame.
            let lx = dx * cos + dy * sin;
            let ly = -dx * sin + dy * cos;
            let u = lx / w + 0.5;
            let v = ly / h + 0.5;
            if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
                continue;
            }
            dest.blend_pixel(x, y, image.sample_nearest([u, v]), opacity);
        }
    }
}

/// Bake every decal in `store` into working copies of `models`.
///
/// Returned assets have the baked albedo swapped in; the inputs and their
/// textures are left untouched. Decals whose target is not among `models` are
/// skipped with a warning.
pub fn bake_decals<'a>(
    models: impl IntoIterator<Item = &'a ModelAsset>,
    store: &DecalStore,
    options: &BakeOptions,
) -> Result<Vec<ModelAsset>> {
    let mut result = Vec::new();
    let mut known = HashSet::new();

    for model in models {
        known.insert(model.id);
        let mut working = model.clone();
        let decals = store.list_for_model(model.id);

        for baked in bake_model(model, &decals, options)? {
            if let Some(material) = working.materials.get_mut(baked.material) {
                if material.albedo.is_none() {
                    // The solid base already carries the material color.
                    material.color = [1.0, 1.0, 1.0];
                    material.opacity = 1.0;
                }
                material.albedo = Some(Arc::new(baked.texture));
            }
        }
        result.push(working);
    }

    for decal in store.iter().filter(|d| !known.contains(&d.target)) {
        log::warn!("{} targets missing {}, skipping", decal.id, decal.target);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal::store::DecalOptions;
    use crate::geometry::Geometry;
    use crate::model::{MeshRecord, ModelScene, ModelStore};
    use crate::types::{DecalId, ModelId, Transform};

    const MAGENTA: [u8; 4] = [255, 0, 255, 255];
    const BASE: [u8; 4] = [40, 80, 120, 255];

    fn plane_scene(size: f32, albedo: Option<TextureData>) -> ModelScene {
        let plane = Geometry::from_positions(&[
            [0.0, 0.0, 0.0],
            [size, 0.0, 0.0],
            [size, size, 0.0],
            [0.0, size, 0.0],
        ])
        .with_uvs(&[[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]])
        .with_indices(vec![0, 1, 2, 0, 2, 3]);

        let mut material = MaterialRecord::new("plane").with_color([0.0, 1.0, 0.0]);
        material.albedo = albedo.map(Arc::new);
        let mut scene = ModelScene::new();
        let index = scene.add_material(material);
        scene.add_mesh(MeshRecord::new("plane", plane, index));
        scene
    }

    fn decal(uv_hint: Option<[f32; 2]>, position: [f32; 3], opacity: f32) -> DecalInstance {
        DecalInstance {
            id: DecalId(1),
            target: ModelId(1),
            position,
            rotation: [0.0; 3],
            scale: [1.0; 3],
            opacity,
            uv_hint,
            image: Arc::new(TextureData::solid(8, 8, MAGENTA)),
        }
    }

    fn plane_model() -> ModelAsset {
        ModelAsset::new(
            ModelId(1),
            "plane",
            plane_scene(10.0, Some(TextureData::solid(256, 256, BASE))),
            Transform::default(),
        )
    }

    #[test]
    fn test_hinted_decal_lands_at_center() {
        let model = plane_model();
        let d = decal(Some([0.5, 0.5]), [0.0; 3], 1.0);
        let baked = bake_model(&model, &[&d], &BakeOptions::default()).unwrap();

        assert_eq!(baked.len(), 1);
        let texture = &baked[0].texture;
        assert_eq!((texture.width, texture.height), (256, 256));
        assert_eq!(texture.get_pixel(128, 128), MAGENTA);
        // Footprint is 1/10 of the image: about 25 pixels wide.
        assert_eq!(texture.get_pixel(128 + 14, 128), BASE);
        assert_eq!(texture.get_pixel(10, 10), BASE);
        assert_eq!(texture.get_pixel(250, 250), BASE);
    }

    #[test]
    fn test_source_texture_is_not_mutated() {
        let model = plane_model();
        let before = model.materials[0].albedo.clone().unwrap();
        let d = decal(Some([0.5, 0.5]), [0.0; 3], 1.0);
        bake_model(&model, &[&d], &BakeOptions::default()).unwrap();
        assert_eq!(model.materials[0].albedo.as_deref(), Some(before.as_ref()));
        assert_eq!(before.get_pixel(128, 128), BASE);
    }

    #[test]
    fn test_zero_opacity_leaves_base() {
        let model = plane_model();
        let d = decal(Some([0.5, 0.5]), [0.0; 3], 0.0);
        let baked = bake_model(&model, &[&d], &BakeOptions::default()).unwrap();
        assert_eq!(baked[0].texture.get_pixel(128, 128), BASE);
    }

    #[test]
    fn test_projected_decal_respects_v_convention() {
        let model = plane_model();
        // Near the top of the plane (high y) maps to small v, so the top image rows.
        let d = decal(None, [5.0, 9.0, 0.0], 1.0);
        let baked = bake_model(&model, &[&d], &BakeOptions::default()).unwrap();
        let texture = &baked[0].texture;
        let expected_row = (0.1 * 256.0) as u32;
        assert_eq!(texture.get_pixel(128, expected_row), MAGENTA);
        assert_eq!(texture.get_pixel(128, 256 - expected_row), BASE);
    }

    #[test]
    fn test_target_size_and_missing_albedo() {
        let model = ModelAsset::new(ModelId(1), "plain", plane_scene(10.0, None), Transform::default());
        let d = decal(Some([0.5, 0.5]), [0.0; 3], 1.0);

        let baked = bake_model(&model, &[&d], &BakeOptions::default()).unwrap();
        assert_eq!(baked[0].texture.width, DEFAULT_BAKE_SIZE);
        assert_eq!(baked[0].texture.get_pixel(0, 0), [0, 255, 0, 255]);

        let options = BakeOptions {
            target_size: Some((64, 32)),
        };
        let baked = bake_model(&model, &[&d], &options).unwrap();
        assert_eq!((baked[0].texture.width, baked[0].texture.height), (64, 32));
    }

    #[test]
    fn test_later_decals_draw_on_top() {
        let model = plane_model();
        let first = decal(Some([0.5, 0.5]), [0.0; 3], 1.0);
        let mut second = decal(Some([0.5, 0.5]), [0.0; 3], 1.0);
        second.image = Arc::new(TextureData::solid(8, 8, [0, 0, 0, 255]));

        let baked = bake_model(&model, &[&first, &second], &BakeOptions::default()).unwrap();
        assert_eq!(baked[0].decal_count, 2);
        assert_eq!(baked[0].texture.get_pixel(128, 128), [0, 0, 0, 255]);
    }

    #[test]
    fn test_bake_decals_swaps_albedo_on_copies_only() {
        let mut models = ModelStore::new();
        let id = models.add(
            "plane",
            plane_scene(10.0, Some(TextureData::solid(64, 64, BASE))),
            Transform::default(),
        );
        let other = models.add("bare", plane_scene(1.0, None), Transform::default());

        let mut decals = DecalStore::new();
        decals
            .add(
                &models,
                id,
                Arc::new(TextureData::solid(8, 8, MAGENTA)),
                DecalOptions {
                    uv_hint: Some([0.5, 0.5]),
                    ..DecalOptions::default()
                },
            )
            .unwrap();

        let working = bake_decals(models.iter(), &decals, &BakeOptions::default()).unwrap();
        assert_eq!(working.len(), 2);

        let baked = working[0].materials[0].albedo.as_ref().unwrap();
        assert_eq!(baked.get_pixel(32, 32), MAGENTA);
        let source = models.get(id).unwrap().materials[0].albedo.as_ref().unwrap();
        assert_eq!(source.get_pixel(32, 32), BASE);

        // No decals: untouched copy.
        assert_eq!(&working[1], models.get(other).unwrap());
    }

    #[test]
    fn test_dangling_decals_are_skipped() {
        let mut models = ModelStore::new();
        let id = models.add("plane", plane_scene(10.0, None), Transform::default());
        let mut decals = DecalStore::new();
        decals
            .add(&models, id, Arc::new(TextureData::solid(1, 1, MAGENTA)), DecalOptions::default())
            .unwrap();
        models.remove(id).unwrap();

        let working = bake_decals(models.iter(), &decals, &BakeOptions::default()).unwrap();
        assert!(working.is_empty());
    }
}
