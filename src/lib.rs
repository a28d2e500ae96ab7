//! # Model Merger
//!
//! A Rust library for merging independently authored, textured 3D models into a
//! single mesh with a single material.
//!
//! ## Overview
//!
//! Models are registered with a transform, decals are placed on them, and a merge
//! runs a staged pipeline:
//!
//! 1. decals are baked into each model's own albedo textures,
//! 2. every mesh is transformed into world space and concatenated into one
//!    non-indexed buffer, remembering which triangles use which source material,
//! 3. the source textures of every channel are packed into one atlas per channel
//!    and the merged UVs are rewritten into their atlas rectangles.
//!
//! The result can be exported as GLB with the atlases embedded.
//!
//! ## Quick Start
//!
//! ```ignore
//! use model_merger::{MergeOptions, ModelMerger, Transform, DecalOptions};
//!
//! let mut merger = ModelMerger::new();
//! let chair = merger.add_model("chair", &std::fs::read("chair.glb")?, Transform::default())?;
//! merger.add_decal_from_bytes(chair, &std::fs::read("logo.png")?, DecalOptions {
//!     uv_hint: Some([0.5, 0.5]),
//!     ..DecalOptions::default()
//! })?;
//!
//! merger.merge(&MergeOptions::default())?;
//! let glb_bytes = merger.export()?;
//! ```
//!
//! ## Library Integration
//!
//! The pipeline stages are plain functions over value types and can be used on
//! their own:
//!
//! ```ignore
//! use model_merger::{merge_models, AtlasBuilder, AtlasOptions};
//!
//! let mut merged = merge_models(&models)?;
//! let atlas = AtlasBuilder::new(AtlasOptions::default()).build(&mut merged)?;
//! ```

pub mod atlas;
pub mod codec;
pub mod decal;
pub mod engine;
pub mod error;
pub mod export;
pub mod geometry;
pub mod import;
pub mod material;
pub mod merge;
pub mod model;
pub mod texture;
pub mod types;

// Re-export main types for convenience
pub use atlas::{AtlasBuilder, AtlasMode, AtlasOptions, AtlasResult, MaterialOverrides, PackedRect};
pub use codec::{ImageCodec, ModelDecoder, ModelEncoder, PngCodec};
pub use decal::{BakeOptions, DecalInstance, DecalOptions, DecalStore, DecalTransform};
pub use engine::{MergeOptions, MergeOutput, MergeStage, ModelMerger, ProgressSink};
pub use error::{MergeError, Result};
pub use export::{export_glb, GlbEncoder};
pub use geometry::{Attribute, Geometry};
pub use import::{import_glb, GlbDecoder};
pub use material::{MaterialRecord, TextureChannel};
pub use merge::{merge_models, MaterialKey, MaterialMapping, MergedGeometry};
pub use model::{MeshRecord, ModelAsset, ModelInfo, ModelScene, ModelStore};
pub use texture::{load_texture_from_bytes, TextureData};
pub use types::{BoundingBox, DecalId, ModelId, Transform};
