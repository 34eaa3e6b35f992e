//! Frame orchestration core.
//!
//! Turns a scene of camera and mesh entities into presented frames: backend
//! device selection, swap-chain and depth-buffer creation, per-frame constant
//! updates, and dispatch to pluggable [`Renderer`] strategies.
//!
//! # Invariants
//! - Renderers never mutate scene state; they read meshes and table constants.
//! - No table resource is reachable before the table is built.
//! - A frame is context update, clears, draws, then a single present.
//!
//! Concrete GPU drivers plug in through [`DeviceCatalog`]. The crate ships a
//! [`HeadlessDevice`] that validates and records commands without a GPU, and a
//! [`DebugRenderer`] that reports what it draws.

mod config;
mod context;
mod debug;
mod device;
mod effect;
mod factory;
mod headless;
mod math;
mod renderer;
mod resource;
mod system;
mod table;

pub use config::{AppConfig, ConfigError, EngineConfig, GraphicsConfig, Msaa, WindowHandle};
pub use context::{
    DrawingContext, FrameTime, PROJECTION, SCREEN_DEPTH_BUFFER, SCREEN_TARGET, TIME, VIEW,
    VIEW_PROJECTION, VIEWPORT, WORLD,
};
pub use debug::{DEBUG_EFFECT, DEBUG_PIPELINE, DEBUG_TRANSFORMS, DebugRenderer};
pub use device::{Device, DeviceCatalog, DeviceConstructor, DeviceError, DeviceType, UnknownDeviceType};
pub use effect::EffectPool;
pub use factory::ResourceFactory;
pub use headless::{DeviceCommand, HeadlessDevice};
pub use math::{FIXED_TARGET, UP, projection_matrix, view_matrix, world_matrix};
pub use renderer::{Renderer, RendererCatalog, SharedRenderer};
pub use resource::{
    Buffer, BufferDesc, BufferUsage, ClearFlags, DepthBuffer, DepthBufferDesc, Effect, EffectDesc,
    PipelineState, PipelineStateDesc, PixelFormat, PrimitiveTopology, ResourceHandle,
    ResourceKind, Target, TargetDesc, Texture, TextureDesc, Viewport,
};
pub use system::{
    DEPTH_FORMAT, DrawingError, DrawingSystem, FrameStats, InitStage, SWAP_CHAIN_FORMAT,
    SystemState,
};
pub use table::{
    ConstantKind, ConstantValue, Resource, ResourceDesc, ResourceTable, TableError, TablePhase,
};

pub fn crate_info() -> &'static str {
    "prism-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
