//! GPU resource descriptors and the backend-neutral handles devices return.

use crate::config::WindowHandle;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Opaque backend handle. Only the device that issued it can interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle(pub u64);

/// Category of a GPU resource, used in errors and table type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Target,
    DepthBuffer,
    Buffer,
    Texture,
    PipelineState,
    Effect,
    Constant,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Target => "target",
            Self::DepthBuffer => "depth buffer",
            Self::Buffer => "buffer",
            Self::Texture => "texture",
            Self::PipelineState => "pipeline state",
            Self::Effect => "effect",
            Self::Constant => "constant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    R8G8B8A8Unorm,
    R32G32B32A32Float,
    D24UnormS8Uint,
    D32Float,
}

impl PixelFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32Float)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8G8B8A8Unorm | Self::D24UnormS8Uint | Self::D32Float => 4,
            Self::R32G32B32A32Float => 16,
        }
    }
}

bitflags! {
    /// Which planes of a target a clear touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Swap-chain (color target) descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDesc {
    pub window: Option<WindowHandle>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sample_count: u32,
    pub sample_quality: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthBufferDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub sample_count: u32,
    pub sample_quality: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferUsage {
    Constant,
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDesc {
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub mip_levels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    LineList,
}

/// Fixed-function state plus the effect a pass draws with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStateDesc {
    /// Name of an effect compiled through the effect pool.
    pub effect: String,
    pub topology: PrimitiveTopology,
    pub depth_test: bool,
    pub depth_write: bool,
}

/// Shader program source handed to the backend compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDesc {
    pub name: String,
    pub source: String,
    pub vertex_entry: String,
    pub pixel_entry: String,
}

impl EffectDesc {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            vertex_entry: "vs_main".into(),
            pixel_entry: "ps_main".into(),
        }
    }
}

/// Defines a device-created resource type: its descriptor plus the handle.
macro_rules! gpu_resource {
    ($(#[$meta:meta])* $name:ident, $desc:ty) => {
        $(#[$meta])*
        #[derive(Debug, PartialEq)]
        pub struct $name {
            handle: ResourceHandle,
            desc: $desc,
        }

        impl $name {
            pub fn new(handle: ResourceHandle, desc: $desc) -> Self {
                Self { handle, desc }
            }

            pub fn handle(&self) -> ResourceHandle {
                self.handle
            }

            pub fn desc(&self) -> &$desc {
                &self.desc
            }
        }
    };
}

gpu_resource!(
    /// Presentable color target (swap chain).
    Target,
    TargetDesc
);
gpu_resource!(DepthBuffer, DepthBufferDesc);
gpu_resource!(Buffer, BufferDesc);
gpu_resource!(Texture, TextureDesc);
gpu_resource!(PipelineState, PipelineStateDesc);

/// A compiled shader program.
#[derive(Debug, PartialEq)]
pub struct Effect {
    name: String,
    handle: ResourceHandle,
}

impl Effect {
    pub fn new(name: impl Into<String>, handle: ResourceHandle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> ResourceHandle {
        self.handle
    }
}

/// Screen-space rectangle draws are mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering a whole `width` x `height` surface.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::full(0, 0)
    }
}
