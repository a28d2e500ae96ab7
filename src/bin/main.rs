//! Model Merger CLI
//!
//! Merge GLB models and their decals into a single GLB.

use clap::{Parser, Subcommand};
use model_merger::{
    import_glb, DecalOptions, MergeOptions, MergeStage, ModelMerger, TextureChannel, Transform,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "model-merger")]
#[command(author, version, about = "Merge textured models into one mesh with a texture atlas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge the models listed in a JSON scene file
    Merge {
        /// Scene file listing models, decals and merge options
        #[arg(short, long)]
        scene: PathBuf,

        /// Output GLB path
        #[arg(short, long)]
        output: PathBuf,

        /// Atlas size in pixels (overrides the scene options)
        #[arg(long)]
        atlas_size: Option<u32>,

        /// Texture quality from 0.0 to 1.0 (overrides the scene options)
        #[arg(long)]
        quality: Option<f32>,

        /// Also write every channel atlas as PNG into this directory
        #[arg(long)]
        atlas_png: Option<PathBuf>,
    },

    /// Show information about a GLB model
    Info {
        /// Path to a .glb file
        #[arg(short, long)]
        model: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            scene,
            output,
            atlas_size,
            quality,
            atlas_png,
        } => {
            merge_scene(&scene, &output, atlas_size, quality, atlas_png.as_deref())?;
        }
        Commands::Info { model } => {
            show_model_info(&model)?;
        }
    }

    Ok(())
}

fn merge_scene(
    scene_path: &Path,
    output_path: &Path,
    atlas_size: Option<u32>,
    quality: Option<f32>,
    atlas_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading scene from {:?}...", scene_path);
    let scene: SceneInput = serde_json::from_str(&fs::read_to_string(scene_path)?)?;
    let base_dir = scene_path.parent().unwrap_or(Path::new("."));

    let mut options = scene.options;
    if let Some(size) = atlas_size {
        options.atlas_size = size;
    }
    if let Some(quality) = quality {
        options.texture_quality = quality;
    }
    options.validate()?;

    let mut merger = ModelMerger::new();
    merger.set_progress_callback(|stage: MergeStage, fraction: f32| {
        log::info!("[{:>3.0}%] {}", fraction * 100.0, stage);
    });

    for entry in &scene.models {
        let bytes = fs::read(base_dir.join(&entry.path))?;
        let name = entry.name.clone().unwrap_or_else(|| entry.path.clone());
        let id = merger.add_model(name.clone(), &bytes, entry.transform)?;
        println!("  Added model '{}' as {}", name, id);

        for decal in &entry.decals {
            let image = fs::read(base_dir.join(&decal.image))?;
            let decal_id = merger.add_decal_from_bytes(id, &image, decal.options.clone())?;
            println!("    Added {} from {:?}", decal_id, decal.image);
        }
    }

    let output = merger.merge(&options)?;
    println!(
        "  Merged {} triangles with {} source materials into a {}px atlas",
        output.geometry.triangle_count(),
        output.mapping.len(),
        output.atlas.atlas_size
    );
    let channels: Vec<TextureChannel> = output.atlas.textures.keys().copied().collect();

    let glb = merger.export()?;
    fs::write(output_path, &glb)?;
    println!("Exported GLB ({} bytes) to {:?}", glb.len(), output_path);

    if let Some(dir) = atlas_dir {
        fs::create_dir_all(dir)?;
        for channel in channels {
            let png_path = dir.join(format!("atlas_{}.png", channel));
            fs::write(&png_path, merger.encode_atlas(channel)?)?;
            println!("  Atlas: {:?}", png_path);
        }
    }

    Ok(())
}

fn show_model_info(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading model from {:?}...", path);
    let scene = import_glb(&fs::read(path)?)?;

    let textures: usize = scene
        .materials
        .iter()
        .map(|m| TextureChannel::ALL.iter().filter(|&&c| m.texture(c).is_some()).count())
        .sum();

    println!("\nModel Info:");
    println!("  Meshes: {}", scene.meshes.len());
    println!("  Triangles: {}", scene.triangle_count());
    println!("  Materials: {}", scene.materials.len());
    println!("  Texture maps: {}", textures);

    Ok(())
}

// JSON scene format
#[derive(serde::Deserialize)]
struct SceneInput {
    models: Vec<ModelEntry>,
    #[serde(default)]
    options: MergeOptions,
}

#[derive(serde::Deserialize)]
struct ModelEntry {
    /// GLB path, relative to the scene file.
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    transform: Transform,
    #[serde(default)]
    decals: Vec<DecalEntry>,
}

#[derive(serde::Deserialize)]
struct DecalEntry {
    /// Image path, relative to the scene file.
    image: String,
    #[serde(flatten)]
    options: DecalOptions,
}
