//! Texture atlas building.
//!
//! This module packs the textures of every merged material into one atlas per
//! channel and remaps UV coordinates accordingly.

mod builder;
mod packer;

pub use builder::{
    rewrite_uvs, synthesize_material, AtlasBuilder, AtlasMode, AtlasOptions, AtlasResult,
    MaterialOverrides, FALLBACK_TEXTURE_SIZE,
};
pub use packer::{fit_to_atlas, pack, PackLayout, PackedRect};
