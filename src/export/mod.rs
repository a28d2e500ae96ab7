//! Mesh export formats.

pub mod gltf;

pub use self::gltf::{export_glb, GlbEncoder};
