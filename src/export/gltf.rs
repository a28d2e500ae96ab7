//! glTF/GLB export.

use crate::codec::ModelEncoder;
use crate::error::{BoxError, MergeError, Result};
use crate::geometry::{Geometry, NORMAL, UV};
use crate::material::MaterialRecord;
use crate::texture::{Resample, TextureData};
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use std::mem;

/// Default model encoder: a single-mesh, single-material GLB.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlbEncoder;

impl ModelEncoder for GlbEncoder {
    fn encode(
        &self,
        geometry: &Geometry,
        material: &MaterialRecord,
    ) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(export_glb(geometry, material)?)
    }
}

/// Export a geometry and its material to GLB (binary glTF) with embedded PNG textures.
///
/// Roughness and metalness maps are combined into one metallic-roughness texture
/// (roughness in G, metalness in B).
pub fn export_glb(geometry: &Geometry, material: &MaterialRecord) -> Result<Vec<u8>> {
    if geometry.triangle_count() == 0 {
        return Err(MergeError::Export("Cannot export empty mesh".into()));
    }

    let vertex_count = geometry.vertex_count();
    let positions = geometry.positions_flat();
    let normals = attribute_if_complete(geometry, NORMAL, vertex_count);
    let uvs = attribute_if_complete(geometry, UV, vertex_count);
    let indices: Vec<u32> = match &geometry.indices {
        Some(indices) => indices[..indices.len() - indices.len() % 3].to_vec(),
        None => (0..(geometry.triangle_count() * 3) as u32).collect(),
    };

    // Build the binary buffer incrementally
    let mut buffer_data: Vec<u8> = Vec::new();
    let mut buffer_views = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = std::collections::BTreeMap::new();

    let bounds = geometry
        .bounding_box()
        .map_or(([0.0; 3], [0.0; 3]), |b| (b.min, b.max));

    let view = push_view(&mut buffer_data, &mut buffer_views, bytemuck_cast_slice(positions), Some(json::buffer::Target::ArrayBuffer));
    attributes.insert(
        Valid(json::mesh::Semantic::Positions),
        push_accessor(&mut accessors, view, vertex_count, json::accessor::Type::Vec3, json::accessor::ComponentType::F32, Some(bounds)),
    );
    if let Some(normals) = normals {
        let view = push_view(&mut buffer_data, &mut buffer_views, bytemuck_cast_slice(normals), Some(json::buffer::Target::ArrayBuffer));
        attributes.insert(
            Valid(json::mesh::Semantic::Normals),
            push_accessor(&mut accessors, view, vertex_count, json::accessor::Type::Vec3, json::accessor::ComponentType::F32, None),
        );
    }
    if let Some(uvs) = uvs {
        let view = push_view(&mut buffer_data, &mut buffer_views, bytemuck_cast_slice(uvs), Some(json::buffer::Target::ArrayBuffer));
        attributes.insert(
            Valid(json::mesh::Semantic::TexCoords(0)),
            push_accessor(&mut accessors, view, vertex_count, json::accessor::Type::Vec2, json::accessor::ComponentType::F32, None),
        );
    }
    let view = push_view(&mut buffer_data, &mut buffer_views, bytemuck_cast_slice(&indices), Some(json::buffer::Target::ElementArrayBuffer));
    let indices_accessor = push_accessor(&mut accessors, view, indices.len(), json::accessor::Type::Scalar, json::accessor::ComponentType::U32, None);

    // Textures, one PNG image each
    let mut images = Vec::new();
    let mut textures = Vec::new();
    let mut push_texture = |buffer_data: &mut Vec<u8>, buffer_views: &mut Vec<json::buffer::View>, texture: &TextureData| -> Result<json::Index<json::Texture>> {
        let png = texture.to_png()?;
        let view = push_view(buffer_data, buffer_views, &png, None);
        let image_idx = images.len() as u32;
        images.push(json::Image {
            buffer_view: Some(view),
            mime_type: Some(json::image::MimeType("image/png".to_string())),
            uri: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        let texture_idx = textures.len() as u32;
        textures.push(json::Texture {
            sampler: Some(json::Index::new(0)),
            source: json::Index::new(image_idx),
            extensions: Default::default(),
            extras: Default::default(),
        });
        Ok(json::Index::new(texture_idx))
    };

    let base_color_texture = match &material.albedo {
        Some(albedo) => Some(push_texture(&mut buffer_data, &mut buffer_views, albedo)?),
        None => None,
    };
    let normal_texture = match &material.normal {
        Some(normal) => Some(push_texture(&mut buffer_data, &mut buffer_views, normal)?),
        None => None,
    };
    let metallic_roughness_texture = match combine_metallic_roughness(material)? {
        Some(combined) => Some(push_texture(&mut buffer_data, &mut buffer_views, &combined)?),
        None => None,
    };
    let occlusion_texture = match &material.ao_map {
        Some(ao) => Some(push_texture(&mut buffer_data, &mut buffer_views, ao)?),
        None => None,
    };
    let emissive_texture = match &material.emissive_map {
        Some(emissive) => Some(push_texture(&mut buffer_data, &mut buffer_views, emissive)?),
        None => None,
    };

    let transparent = material.opacity < 1.0
        || material.albedo.as_ref().is_some_and(|albedo| albedo.has_transparency());

    let gltf_material = create_material(
        material,
        transparent,
        base_color_texture,
        normal_texture,
        metallic_roughness_texture,
        occlusion_texture,
        emissive_texture,
    );

    let total_buffer_size = buffer_data.len();

    // Build glTF JSON
    let root = json::Root {
        accessors,
        buffers: vec![json::Buffer {
            byte_length: USize64(total_buffer_size as u64),
            extensions: Default::default(),
            extras: Default::default(),
            uri: None,
        }],
        buffer_views,
        images,
        samplers: vec![json::texture::Sampler {
            mag_filter: Some(Valid(json::texture::MagFilter::Linear)),
            min_filter: Some(Valid(json::texture::MinFilter::Linear)),
            wrap_s: Valid(json::texture::WrappingMode::ClampToEdge),
            wrap_t: Valid(json::texture::WrappingMode::ClampToEdge),
            extensions: Default::default(),
            extras: Default::default(),
        }],
        textures,
        materials: vec![gltf_material],
        meshes: vec![json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            primitives: vec![json::mesh::Primitive {
                attributes,
                extensions: Default::default(),
                extras: Default::default(),
                indices: Some(indices_accessor),
                material: Some(json::Index::new(0)),
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
            }],
            weights: None,
        }],
        nodes: vec![json::Node {
            camera: None,
            children: None,
            extensions: Default::default(),
            extras: Default::default(),
            matrix: None,
            mesh: Some(json::Index::new(0)),
            rotation: None,
            scale: None,
            translation: None,
            skin: None,
            weights: None,
        }],
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            nodes: vec![json::Index::new(0)],
        }],
        scene: Some(json::Index::new(0)),
        ..Default::default()
    };

    // Serialize JSON
    let json_string = json::serialize::to_string(&root)?;

    let glb = write_glb(json_string.as_bytes(), &buffer_data);
    log::debug!(
        "Encoded GLB: {} vertices, {} textures, {} bytes",
        vertex_count,
        root.textures.len(),
        glb.len()
    );
    Ok(glb)
}

/// Assemble the GLB container from a JSON document and its binary buffer.
pub(crate) fn write_glb(json_bytes: &[u8], buffer_data: &[u8]) -> Vec<u8> {
    // Pad JSON to 4-byte alignment
    let json_padding = (4 - (json_bytes.len() % 4)) % 4;
    let padded_json_len = json_bytes.len() + json_padding;

    // Pad buffer to 4-byte alignment
    let buffer_padding = (4 - (buffer_data.len() % 4)) % 4;
    let padded_buffer_len = buffer_data.len() + buffer_padding;

    // Calculate total size
    let total_size = 12 + // GLB header
        8 + padded_json_len + // JSON chunk
        8 + padded_buffer_len; // BIN chunk

    let mut glb = Vec::with_capacity(total_size);

    // GLB Header
    glb.extend_from_slice(b"glTF"); // magic
    glb.extend_from_slice(&2u32.to_le_bytes()); // version
    glb.extend_from_slice(&(total_size as u32).to_le_bytes()); // length

    // JSON Chunk
    glb.extend_from_slice(&(padded_json_len as u32).to_le_bytes()); // chunk length
    glb.extend_from_slice(&0x4E4F534Au32.to_le_bytes()); // chunk type: JSON
    glb.extend_from_slice(json_bytes);
    glb.extend_from_slice(&vec![0x20u8; json_padding]); // padding (spaces)

    // BIN Chunk
    glb.extend_from_slice(&(padded_buffer_len as u32).to_le_bytes()); // chunk length
    glb.extend_from_slice(&0x004E4942u32.to_le_bytes()); // chunk type: BIN
    glb.extend_from_slice(buffer_data);
    glb.extend_from_slice(&vec![0u8; buffer_padding]); // padding (zeros)

    glb
}

fn attribute_if_complete<'a>(geometry: &'a Geometry, name: &str, vertex_count: usize) -> Option<&'a [f32]> {
    geometry
        .attribute(name)
        .filter(|a| a.count() == vertex_count)
        .map(|a| a.data.as_slice())
}

/// Pack roughness (G) and metalness (B) maps into one glTF metallic-roughness image.
/// A missing map is filled with 255 so the scalar factor applies unchanged.
fn combine_metallic_roughness(material: &MaterialRecord) -> Result<Option<TextureData>> {
    let (width, height) = match (&material.roughness_map, &material.metalness_map) {
        (None, None) => return Ok(None),
        (Some(map), _) | (None, Some(map)) => (map.width, map.height),
    };

    let channel = |map: &Option<std::sync::Arc<TextureData>>| -> Result<Option<TextureData>> {
        map.as_ref()
            .map(|m| m.resized(width, height, Resample::Bilinear))
            .transpose()
    };
    let roughness = channel(&material.roughness_map)?;
    let metalness = channel(&material.metalness_map)?;

    let mut combined = TextureData::solid(width, height, [0, 255, 255, 255]);
    for y in 0..height {
        for x in 0..width {
            let g = roughness.as_ref().map_or(255, |r| r.get_pixel(x, y)[0]);
            let b = metalness.as_ref().map_or(255, |m| m.get_pixel(x, y)[0]);
            combined.put_pixel(x, y, [0, g, b, 255]);
        }
    }
    Ok(Some(combined))
}

/// Append bytes (4-byte aligned) and a buffer view over them.
fn push_view(
    buffer: &mut Vec<u8>,
    views: &mut Vec<json::buffer::View>,
    bytes: &[u8],
    target: Option<json::buffer::Target>,
) -> json::Index<json::buffer::View> {
    let padding = (4 - (buffer.len() % 4)) % 4;
    buffer.extend(std::iter::repeat(0u8).take(padding));
    let offset = buffer.len();
    buffer.extend_from_slice(bytes);

    views.push(json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64(bytes.len() as u64),
        byte_offset: Some(USize64(offset as u64)),
        byte_stride: None,
        extensions: Default::default(),
        extras: Default::default(),
        target: target.map(Valid),
    });
    json::Index::new(views.len() as u32 - 1)
}

/// Create an accessor.
fn push_accessor(
    accessors: &mut Vec<json::Accessor>,
    buffer_view: json::Index<json::buffer::View>,
    count: usize,
    type_: json::accessor::Type,
    component_type: json::accessor::ComponentType,
    bounds: Option<([f32; 3], [f32; 3])>,
) -> json::Index<json::Accessor> {
    accessors.push(json::Accessor {
        buffer_view: Some(buffer_view),
        byte_offset: Some(USize64(0)),
        count: USize64(count as u64),
        component_type: Valid(json::accessor::GenericComponentType(component_type)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(type_),
        min: bounds.map(|(min, _)| json::Value::from(min.to_vec())),
        max: bounds.map(|(_, max)| json::Value::from(max.to_vec())),
        normalized: false,
        sparse: None,
    });
    json::Index::new(accessors.len() as u32 - 1)
}

fn texture_info(index: json::Index<json::Texture>) -> json::texture::Info {
    json::texture::Info {
        index,
        tex_coord: 0,
        extensions: Default::default(),
        extras: Default::default(),
    }
}

/// Create the PBR material. Scalars that a texture already carries are written as 1.
fn create_material(
    material: &MaterialRecord,
    transparent: bool,
    base_color_texture: Option<json::Index<json::Texture>>,
    normal_texture: Option<json::Index<json::Texture>>,
    metallic_roughness_texture: Option<json::Index<json::Texture>>,
    occlusion_texture: Option<json::Index<json::Texture>>,
    emissive_texture: Option<json::Index<json::Texture>>,
) -> json::Material {
    let base_color_factor = if base_color_texture.is_some() {
        [1.0, 1.0, 1.0, 1.0]
    } else {
        let [r, g, b] = material.color;
        [r, g, b, material.opacity.clamp(0.0, 1.0)]
    };
    let (metallic_factor, roughness_factor) = if metallic_roughness_texture.is_some() {
        (
            if material.metalness_map.is_some() { 1.0 } else { material.metalness },
            if material.roughness_map.is_some() { 1.0 } else { material.roughness },
        )
    } else {
        (material.metalness, material.roughness)
    };
    // glTF emissive factors are limited to [0, 1]; intensity is folded in.
    let emissive_factor = if emissive_texture.is_some() {
        [material.emissive_intensity.clamp(0.0, 1.0); 3]
    } else {
        material
            .emissive
            .map(|c| (c * material.emissive_intensity).clamp(0.0, 1.0))
    };

    json::Material {
        pbr_metallic_roughness: json::material::PbrMetallicRoughness {
            base_color_texture: base_color_texture.map(texture_info),
            base_color_factor: json::material::PbrBaseColorFactor(base_color_factor),
            metallic_factor: json::material::StrengthFactor(metallic_factor.clamp(0.0, 1.0)),
            roughness_factor: json::material::StrengthFactor(roughness_factor.clamp(0.0, 1.0)),
            metallic_roughness_texture: metallic_roughness_texture.map(texture_info),
            extensions: Default::default(),
            extras: Default::default(),
        },
        alpha_mode: Valid(if transparent {
            json::material::AlphaMode::Blend
        } else {
            json::material::AlphaMode::Opaque
        }),
        alpha_cutoff: None,
        double_sided: true,
        normal_texture: normal_texture.map(|index| json::material::NormalTexture {
            index,
            scale: 1.0,
            tex_coord: 0,
            extensions: Default::default(),
            extras: Default::default(),
        }),
        occlusion_texture: occlusion_texture.map(|index| json::material::OcclusionTexture {
            index,
            strength: json::material::StrengthFactor(1.0),
            tex_coord: 0,
            extensions: Default::default(),
            extras: Default::default(),
        }),
        emissive_texture: emissive_texture.map(texture_info),
        emissive_factor: json::material::EmissiveFactor(emissive_factor),
        extensions: Default::default(),
        extras: Default::default(),
    }
}

/// Cast a slice of T to a slice of bytes.
fn bytemuck_cast_slice<T: Copy>(slice: &[T]) -> &[u8] {
    let ptr = slice.as_ptr() as *const u8;
    let len = slice.len() * mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts(ptr, len) }
}
