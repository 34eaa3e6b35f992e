use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use prism_common::{Mesh, RendererType, Transform};
use prism_ecs::{Camera, ComponentEvent, ComponentStore, Name};
use prism_render::{
    DebugRenderer, DeviceCatalog, DeviceType, DrawingSystem, EngineConfig, FrameStats,
    RendererCatalog,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prism-cli", about = "Drive the prism drawing system headlessly")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions, backends and renderer types
    Info,
    /// Initialize the drawing system and render frames on the headless backend
    Run {
        /// Number of frames to render
        #[arg(short, long, default_value = "3")]
        frames: u64,
        /// Backend variant (d3d11 or d3d12); overrides the config file
        #[arg(short, long)]
        device: Option<DeviceType>,
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Renderer type number used by the demo camera
        #[arg(short, long, default_value = "1")]
        renderer: u32,
        /// Number of cubes in the demo scene
        #[arg(short, long, default_value = "3")]
        meshes: usize,
    },
    /// Print the effective configuration as YAML
    Config {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("prism-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", prism_common::crate_info());
            println!("ecs: {}", prism_ecs::crate_info());
            println!("render: {}", prism_render::crate_info());
            let backends: Vec<String> = DeviceCatalog::headless()
                .types()
                .map(|ty| ty.to_string())
                .collect();
            println!("backends: {}", backends.join(", "));
            let renderers: Vec<String> = RendererType::all()
                .map(|ty| format!("{}={ty}", ty.as_u32()))
                .collect();
            println!("renderer types: {}", renderers.join(", "));
        }
        Commands::Run {
            frames,
            device,
            config,
            renderer,
            meshes,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(device) = device {
                config.graphics.device = device;
            }
            let renderer_type = RendererType::try_from(renderer)?;
            run(&config, renderer_type, frames, meshes)?;
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn run(
    config: &EngineConfig,
    renderer_type: RendererType,
    frames: u64,
    meshes: usize,
) -> anyhow::Result<()> {
    println!(
        "Run: device={}, {}x{}, msaa={:?}, renderer={renderer_type}, frames={frames}",
        config.graphics.device, config.app.width, config.app.height, config.graphics.msaa
    );

    let devices = DeviceCatalog::headless();
    let mut renderers = RendererCatalog::new();
    let debug = renderers.register(RendererType::Forward, DebugRenderer::new());
    renderers.insert(RendererType::Debug, debug.clone());

    let mut system = DrawingSystem::from_config(config);
    system
        .initialize(Some(config), &devices, &renderers)
        .context("initializing drawing system")?;

    let mut scene = ComponentStore::new();
    let camera = scene.spawn_camera(
        Vec3::new(0.0, 2.0, -10.0),
        Camera::with_renderer(renderer_type),
    );
    scene.insert(camera, Name("main camera".into()));

    let cube = Arc::new(Mesh::cube());
    let offset = meshes.saturating_sub(1) as f32;
    let mut cubes = Vec::with_capacity(meshes);
    for i in 0..meshes {
        let transform = Transform::from_position(Vec3::new(i as f32 * 2.0 - offset, 0.0, 0.0));
        cubes.push(scene.spawn_mesh(transform, cube.clone()));
    }

    for event in scene.drain_events() {
        if let ComponentEvent::Spawned { entity } = event {
            system.flush_entity(&scene, entity);
        }
    }
    println!(
        "Scene: cameras={}, meshes={}",
        system.camera_count(),
        system.mesh_count()
    );

    let mut totals = FrameStats::default();
    for frame in 0..frames {
        let stats = system.tick(&scene, 1.0 / 60.0)?;
        tracing::info!(frame, ?stats, "frame rendered");
        totals.cameras += stats.cameras;
        totals.cameras_skipped += stats.cameras_skipped;
        totals.draw_calls += stats.draw_calls;
        totals.meshes_skipped += stats.meshes_skipped;

        for id in &cubes {
            if let Some(transform) = scene.get_mut::<Transform>(*id) {
                transform.rotation.y += 0.1;
            }
        }
    }

    println!(
        "Frames: {frames}, cameras={}, skipped={}, draws={}",
        totals.cameras, totals.cameras_skipped, totals.draw_calls
    );
    let report = debug.borrow_mut().take_report();
    if report.is_empty() {
        println!("Debug renderer: no draws (renderer type {renderer_type} not registered)");
    } else {
        print!("{report}");
    }

    system.shutdown();
    Ok(())
}
