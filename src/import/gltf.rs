//! GLB import.
//!
//! Reads self-contained binary glTF files: every buffer and image must live in
//! the embedded BIN chunk. Node transforms are composed down the hierarchy into
//! each mesh's local matrix.

use crate::codec::ModelDecoder;
use crate::error::{BoxError, MergeError, Result};
use crate::geometry::{Attribute, Geometry, NORMAL, UV};
use crate::material::MaterialRecord;
use crate::model::{MeshRecord, ModelScene};
use crate::texture::{load_texture_from_bytes, TextureData};
use glam::Mat4;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Default model decoder for `.glb` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlbDecoder;

impl ModelDecoder for GlbDecoder {
    fn decode(&self, bytes: &[u8]) -> std::result::Result<ModelScene, BoxError> {
        Ok(import_glb(bytes)?)
    }
}

/// Decode a GLB file into a flattened model scene.
pub fn import_glb(bytes: &[u8]) -> Result<ModelScene> {
    let gltf = gltf::Gltf::from_slice(bytes).map_err(|e| MergeError::AssetLoad(Box::new(e)))?;

    let mut buffers = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => match gltf.blob.as_deref() {
                Some(blob) => buffers.push(blob),
                None => return Err(MergeError::AssetLoad("GLB has no BIN chunk".into())),
            },
            gltf::buffer::Source::Uri(uri) => {
                return Err(MergeError::AssetLoad(
                    format!("external buffer '{}' is not supported", uri).into(),
                ))
            }
        }
    }

    let mut importer = Importer {
        buffers,
        images: HashMap::new(),
        metal_rough: HashMap::new(),
        materials: HashMap::new(),
        scene: ModelScene::new(),
    };

    for node in root_nodes(&gltf) {
        importer.visit_node(node, Mat4::IDENTITY)?;
    }

    log::debug!(
        "Imported GLB: {} meshes, {} materials, {} textures",
        importer.scene.meshes.len(),
        importer.scene.materials.len(),
        importer.images.len()
    );
    Ok(importer.scene)
}

/// Root nodes of the default scene, or of the whole node forest when no scene exists.
fn root_nodes(document: &gltf::Document) -> Vec<gltf::Node<'_>> {
    if let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) {
        return scene.nodes().collect();
    }
    let children: HashSet<usize> = document
        .nodes()
        .flat_map(|n| n.children().map(|c| c.index()))
        .collect();
    document
        .nodes()
        .filter(|n| !children.contains(&n.index()))
        .collect()
}

struct Importer<'a> {
    buffers: Vec<&'a [u8]>,
    /// Decoded images by glTF image index.
    images: HashMap<usize, Arc<TextureData>>,
    /// Split metallic-roughness maps by (image index, factor bits).
    metal_rough: HashMap<(usize, u32, u32), (Arc<TextureData>, Arc<TextureData>)>,
    /// Scene material index by glTF material index (`None` is the default material).
    materials: HashMap<Option<usize>, usize>,
    scene: ModelScene,
}

impl<'a> Importer<'a> {
    fn visit_node(&mut self, node: gltf::Node<'_>, parent: Mat4) -> Result<()> {
        let matrix = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "Skipping primitive {} of mesh {}: mode {:?} is not triangles",
                        primitive.index(),
                        mesh.index(),
                        primitive.mode()
                    );
                    continue;
                }

                let Some(geometry) = self.read_geometry(&primitive) else {
                    log::warn!(
                        "Skipping primitive {} of mesh {}: no positions",
                        primitive.index(),
                        mesh.index()
                    );
                    continue;
                };
                let material = self.material(primitive.material())?;
                let name = format!("mesh{}.{}", mesh.index(), primitive.index());
                self.scene
                    .add_mesh(MeshRecord::new(name, geometry, material).with_local_matrix(matrix));
            }
        }

        for child in node.children() {
            self.visit_node(child, matrix)?;
        }
        Ok(())
    }

    fn read_geometry(&self, primitive: &gltf::Primitive<'_>) -> Option<Geometry> {
        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).copied());

        let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
        let mut geometry = Geometry::from_positions(&positions);

        if let Some(normals) = reader.read_normals() {
            let normals: Vec<[f32; 3]> = normals.collect();
            if normals.len() == positions.len() {
                geometry.set_attribute(NORMAL, Attribute::from_vec3(&normals));
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            let uvs: Vec<[f32; 2]> = uvs.into_f32().collect();
            if uvs.len() == positions.len() {
                geometry.set_attribute(UV, Attribute::from_vec2(&uvs));
            }
        }
        if let Some(indices) = reader.read_indices() {
            geometry.indices = Some(indices.into_u32().collect());
        }

        Some(geometry)
    }

    fn material(&mut self, material: gltf::Material<'_>) -> Result<usize> {
        if let Some(&index) = self.materials.get(&material.index()) {
            return Ok(index);
        }

        let pbr = material.pbr_metallic_roughness();
        let base = pbr.base_color_factor();
        let mut record = MaterialRecord::new(match material.index() {
            Some(index) => format!("material{}", index),
            None => "default".to_string(),
        });
        record.color = [base[0], base[1], base[2]];
        record.opacity = base[3];
        record.roughness = pbr.roughness_factor();
        record.metalness = pbr.metallic_factor();
        record.emissive = material.emissive_factor();

        if let Some(info) = pbr.base_color_texture() {
            warn_tex_coord(info.tex_coord());
            if let Some(texture) = self.image(info.texture().source())? {
                record.albedo = Some(tint(&texture, base));
            }
        }
        if let Some(info) = pbr.metallic_roughness_texture() {
            warn_tex_coord(info.tex_coord());
            let image = info.texture().source();
            let key = (
                image.index(),
                record.roughness.to_bits(),
                record.metalness.to_bits(),
            );
            if let Some(texture) = self.image(image)? {
                let (roughness, metalness) = self
                    .metal_rough
                    .entry(key)
                    .or_insert_with(|| split_metallic_roughness(&texture, record.roughness, record.metalness))
                    .clone();
                record.roughness_map = Some(roughness);
                record.metalness_map = Some(metalness);
            }
        }
        if let Some(normal) = material.normal_texture() {
            warn_tex_coord(normal.tex_coord());
            record.normal = self.image(normal.texture().source())?;
        }
        if let Some(occlusion) = material.occlusion_texture() {
            warn_tex_coord(occlusion.tex_coord());
            record.ao_map = self.image(occlusion.texture().source())?;
        }
        if let Some(info) = material.emissive_texture() {
            warn_tex_coord(info.tex_coord());
            record.emissive_map = self.image(info.texture().source())?;
        }

        let index = self.scene.add_material(record);
        self.materials.insert(material.index(), index);
        Ok(index)
    }

    fn image(&mut self, image: gltf::Image<'_>) -> Result<Option<Arc<TextureData>>> {
        if let Some(texture) = self.images.get(&image.index()) {
            return Ok(Some(texture.clone()));
        }

        let bytes = match image.source() {
            gltf::image::Source::View { view, .. } => {
                let buffer = self.buffers.get(view.buffer().index()).copied().unwrap_or(&[]);
                let start = view.offset();
                let end = start + view.length();
                buffer.get(start..end).ok_or_else(|| {
                    MergeError::AssetLoad(
                        format!("image {} view is out of buffer bounds", image.index()).into(),
                    )
                })?
            }
            gltf::image::Source::Uri { uri, .. } => {
                log::warn!("Ignoring external image '{}'", uri);
                return Ok(None);
            }
        };

        let texture = Arc::new(load_texture_from_bytes(bytes)?);
        self.images.insert(image.index(), texture.clone());
        Ok(Some(texture))
    }
}

fn warn_tex_coord(set: u32) {
    if set != 0 {
        log::warn!("Texture uses TEXCOORD_{}, only TEXCOORD_0 is imported", set);
    }
}

/// Multiply a base color texture by a non-white factor.
fn tint(texture: &Arc<TextureData>, factor: [f32; 4]) -> Arc<TextureData> {
    if factor == [1.0; 4] {
        return texture.clone();
    }
    let mut tinted = TextureData::clone(texture);
    for pixel in tinted.pixels.chunks_exact_mut(4) {
        for (c, value) in pixel.iter_mut().enumerate() {
            *value = (*value as f32 * factor[c].clamp(0.0, 1.0)).round() as u8;
        }
    }
    Arc::new(tinted)
}

/// Split a glTF metallic-roughness image into grayscale roughness (from G) and
/// metalness (from B) maps, with the scalar factors applied.
pub fn split_metallic_roughness(
    texture: &TextureData,
    roughness_factor: f32,
    metallic_factor: f32,
) -> (Arc<TextureData>, Arc<TextureData>) {
    let mut roughness = TextureData::solid(texture.width, texture.height, [0, 0, 0, 255]);
    let mut metalness = roughness.clone();
    let scale = |value: u8, factor: f32| (value as f32 * factor.clamp(0.0, 1.0)).round() as u8;

    for y in 0..texture.height {
        for x in 0..texture.width {
            let [_, g, b, _] = texture.get_pixel(x, y);
            let r = scale(g, roughness_factor);
            let m = scale(b, metallic_factor);
            roughness.put_pixel(x, y, [r, r, r, 255]);
            metalness.put_pixel(x, y, [m, m, m, 255]);
        }
    }
    (Arc::new(roughness), Arc::new(metalness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::gltf::{export_glb, write_glb};
    use glam::Vec3;

    fn quad() -> Geometry {
        Geometry::from_positions(&[
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ])
        .with_normals(&[[0.0, 0.0, 1.0]; 4])
        .with_uvs(&[[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]])
        .with_indices(vec![0, 1, 2, 0, 2, 3])
    }

    /// Split a GLB into its JSON document and BIN chunk.
    fn chunks(glb: &[u8]) -> (serde_json::Value, Vec<u8>) {
        let json_len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
        let json = serde_json::from_slice(&glb[20..20 + json_len]).unwrap();
        let bin_start = 20 + json_len + 8;
        (json, glb[bin_start..].to_vec())
    }

    #[test]
    fn test_round_trip_geometry_and_material() {
        let mut material = MaterialRecord::new("m").with_albedo(TextureData::solid(4, 4, [200, 10, 10, 255]));
        material.roughness = 0.5;
        let glb = export_glb(&quad(), &material).unwrap();

        let scene = import_glb(&glb).unwrap();
        assert_eq!(scene.meshes.len(), 1);
        assert_eq!(scene.materials.len(), 1);

        let mesh = &scene.meshes[0];
        assert_eq!(mesh.geometry.vertex_count(), 4);
        assert_eq!(mesh.geometry.triangle_count(), 2);
        assert!(mesh.geometry.has_attribute(NORMAL));
        assert_eq!(mesh.geometry.attribute(UV).unwrap().get(2), &[1.0, 0.0]);
        assert_eq!(mesh.local_matrix, Mat4::IDENTITY);

        let imported = &scene.materials[0];
        assert_eq!(imported.albedo.as_ref().unwrap().get_pixel(1, 1), [200, 10, 10, 255]);
        assert!((imported.roughness - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_node_hierarchy_is_composed() {
        let glb = export_glb(&quad(), &MaterialRecord::default()).unwrap();
        let (mut json, bin) = chunks(&glb);

        // Wrap the mesh node in a translated parent and scale the child.
        json["nodes"][0]["scale"] = serde_json::json!([2.0, 2.0, 2.0]);
        json["nodes"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({ "children": [0], "translation": [10.0, 0.0, 0.0] }));
        json["scenes"][0]["nodes"] = serde_json::json!([1]);

        let rebuilt = write_glb(serde_json::to_string(&json).unwrap().as_bytes(), &bin);
        let scene = import_glb(&rebuilt).unwrap();
        let matrix = scene.meshes[0].local_matrix;
        let p = matrix.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!((p - Vec3::new(12.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_metallic_roughness_split() {
        let mut mr = TextureData::solid(2, 1, [0, 200, 100, 255]);
        mr.put_pixel(1, 0, [0, 0, 255, 255]);
        let (roughness, metalness) = split_metallic_roughness(&mr, 1.0, 0.5);
        assert_eq!(roughness.get_pixel(0, 0), [200, 200, 200, 255]);
        assert_eq!(metalness.get_pixel(0, 0), [50, 50, 50, 255]);
        assert_eq!(roughness.get_pixel(1, 0), [0, 0, 0, 255]);
        assert_eq!(metalness.get_pixel(1, 0), [128, 128, 128, 255]);
    }

    #[test]
    fn test_garbage_is_asset_load_error() {
        assert!(matches!(import_glb(b"definitely not glb"), Err(MergeError::AssetLoad(_))));
        assert!(GlbDecoder.decode(&[]).is_err());
    }
}
