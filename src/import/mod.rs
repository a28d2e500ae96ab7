//! Model import formats.

pub mod gltf;

pub use self::gltf::{import_glb, split_metallic_roughness, GlbDecoder};
