//! Decal placement, projection and baking.
//!
//! Decals are registered against a model, resolved to a UV position on one of
//! its materials and composited into that material's albedo before the merge.

mod baker;
mod projector;
mod store;

pub use baker::{bake_decals, bake_model, composite_decal, BakeOptions, BakedTexture, DEFAULT_BAKE_SIZE};
pub use projector::{
    closest_point_barycentric, project_point, resolve, ModelSurface, Projection, SurfaceTriangle,
};
pub use store::{DecalInstance, DecalOptions, DecalStore, DecalTransform};
