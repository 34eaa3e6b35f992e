//! Backend device abstraction.
//!
//! Exactly two backend variants exist ([`DeviceType`]). Concrete drivers live
//! outside this crate and plug in through a [`DeviceCatalog`]; the drawing
//! system never matches on a driver type itself.

use crate::headless::HeadlessDevice;
use crate::resource::*;
use prism_common::Color;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::str::FromStr;

/// GPU API generation a device drives.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceType {
    #[default]
    D3D11,
    D3D12,
}

impl DeviceType {
    pub const ALL: [DeviceType; 2] = [DeviceType::D3D11, DeviceType::D3D12];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::D3D11 => "d3d11",
            Self::D3D12 => "d3d12",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type `{0}` (expected d3d11 or d3d12)")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "d3d11" => Ok(Self::D3D11),
            "d3d12" => Ok(Self::D3D12),
            _ => Err(UnknownDeviceType(s.to_string())),
        }
    }
}

impl TryFrom<String> for DeviceType {
    type Error = UnknownDeviceType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceType> for String {
    fn from(value: DeviceType) -> Self {
        value.as_str().to_string()
    }
}

/// Errors reported by a backend device.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("device is not initialized")]
    NotInitialized,
    #[error("device initialization failed: {0}")]
    Initialization(String),
    #[error("invalid {kind} descriptor: {reason}")]
    InvalidDescriptor { kind: ResourceKind, reason: String },
    #[error("{kind} creation failed: {reason}")]
    CreationFailed { kind: ResourceKind, reason: String },
    #[error("effect `{name}` failed to compile: {reason}")]
    EffectCompilation { name: String, reason: String },
    #[error("effect `{0}` is already compiled from a different descriptor")]
    EffectConflict(String),
    #[error("present failed: {0}")]
    Present(String),
}

/// A GPU backend.
///
/// Methods take `&self`: a device is shared by the drawing system, its context
/// and every attached renderer, so backends keep their own interior state.
/// Creation calls return shared handles; dropping the last handle releases the
/// backend object.
pub trait Device: std::fmt::Debug {
    fn device_type(&self) -> DeviceType;

    fn initialize(&self) -> Result<(), DeviceError>;

    fn create_target(&self, desc: &TargetDesc) -> Result<Rc<Target>, DeviceError>;

    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<Rc<DepthBuffer>, DeviceError>;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Rc<Buffer>, DeviceError>;

    fn create_texture(&self, desc: &TextureDesc) -> Result<Rc<Texture>, DeviceError>;

    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDesc,
        effect: &Effect,
    ) -> Result<Rc<PipelineState>, DeviceError>;

    fn compile_effect(&self, desc: &EffectDesc) -> Result<Rc<Effect>, DeviceError>;

    /// Copy `data` into `buffer` starting at byte `offset`.
    fn update_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    fn clear_target(&self, target: &Target, color: Color);

    fn clear_depth_buffer(&self, buffer: &DepthBuffer, depth: f32, stencil: u8, flags: ClearFlags);

    fn draw_indexed(&self, pipeline: &PipelineState, index_count: u32, start_index: u32);

    /// Present `target`. A `sync_interval` of 0 presents immediately.
    fn present(&self, target: &Target, sync_interval: u32) -> Result<(), DeviceError>;

    /// Submit all queued work.
    fn flush(&self);
}

pub type DeviceConstructor = Box<dyn Fn(DeviceType) -> Rc<dyn Device>>;

/// Maps each backend variant to the constructor of its driver.
///
/// Selecting a variant with no registered constructor is reported as
/// [`DrawingError::UnsupportedDevice`](crate::DrawingError::UnsupportedDevice).
#[derive(Default)]
pub struct DeviceCatalog {
    constructors: BTreeMap<DeviceType, DeviceConstructor>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the headless backend registered for both variants.
    pub fn headless() -> Self {
        let mut catalog = Self::new();
        for ty in DeviceType::ALL {
            catalog.register(ty, |ty| Rc::new(HeadlessDevice::new(ty)) as Rc<dyn Device>);
        }
        catalog
    }

    pub fn register(
        &mut self,
        ty: DeviceType,
        constructor: impl Fn(DeviceType) -> Rc<dyn Device> + 'static,
    ) {
        self.constructors.insert(ty, Box::new(constructor));
    }

    pub fn contains(&self, ty: DeviceType) -> bool {
        self.constructors.contains_key(&ty)
    }

    pub fn types(&self) -> impl Iterator<Item = DeviceType> + '_ {
        self.constructors.keys().copied()
    }

    /// Instantiate the driver for `ty`, if one is registered.
    pub fn create(&self, ty: DeviceType) -> Option<Rc<dyn Device>> {
        self.constructors.get(&ty).map(|construct| construct(ty))
    }
}

impl std::fmt::Debug for DeviceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCatalog")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
