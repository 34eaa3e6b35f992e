//! Named registry of GPU resources.
//!
//! Resources are declared while the table is [`TablePhase::Open`] and allocated
//! together by [`ResourceTable::build`].
//!
//! # Invariants
//!
//! - Nothing is resolvable by name until `build` has succeeded.
//! - `build` is all-or-nothing: a failed allocation leaves the table open with
//!   no resources committed.
//! - After `build`, handles are frozen. Constant values may still be rewritten
//!   through [`ResourceTable::set_constant`], but only with a value of the
//!   declared [`ConstantKind`].

use crate::device::DeviceError;
use crate::factory::ResourceFactory;
use crate::resource::*;
use glam::{Mat4, Vec4};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Shape of a constant slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    Float,
    Vec4,
    Mat4,
}

/// Value held in a constant slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Float(f32),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl ConstantValue {
    /// Zero value of the given kind; every constant starts here after build.
    pub fn zeroed(kind: ConstantKind) -> Self {
        match kind {
            ConstantKind::Float => Self::Float(0.0),
            ConstantKind::Vec4 => Self::Vec4(Vec4::ZERO),
            ConstantKind::Mat4 => Self::Mat4(Mat4::ZERO),
        }
    }

    pub fn kind(&self) -> ConstantKind {
        match self {
            Self::Float(_) => ConstantKind::Float,
            Self::Vec4(_) => ConstantKind::Vec4,
            Self::Mat4(_) => ConstantKind::Mat4,
        }
    }

    /// Raw bytes as they would be uploaded to a constant buffer.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Float(v) => bytemuck::bytes_of(v),
            Self::Vec4(v) => bytemuck::bytes_of(v),
            Self::Mat4(m) => bytemuck::bytes_of(m),
        }
    }
}

/// What a table entry is made from.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDesc {
    Buffer(BufferDesc),
    Texture(TextureDesc),
    PipelineState(PipelineStateDesc),
    Effect(EffectDesc),
    Constant(ConstantKind),
    /// Created outside the table (swap chain, depth buffer) and bound by name.
    External(ResourceKind),
}

impl ResourceDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Buffer(_) => ResourceKind::Buffer,
            Self::Texture(_) => ResourceKind::Texture,
            Self::PipelineState(_) => ResourceKind::PipelineState,
            Self::Effect(_) => ResourceKind::Effect,
            Self::Constant(_) => ResourceKind::Constant,
            Self::External(kind) => *kind,
        }
    }

    /// Allocation order inside `build`: effects before the pipelines using them.
    fn build_rank(&self) -> u8 {
        match self {
            Self::Effect(_) => 0,
            Self::Buffer(_) | Self::Texture(_) => 1,
            Self::PipelineState(_) => 2,
            Self::Constant(_) | Self::External(_) => 3,
        }
    }
}

/// A resolved table entry.
#[derive(Debug, Clone)]
pub enum Resource {
    Buffer(Rc<Buffer>),
    Texture(Rc<Texture>),
    PipelineState(Rc<PipelineState>),
    Effect(Rc<Effect>),
    Target(Rc<Target>),
    DepthBuffer(Rc<DepthBuffer>),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Buffer(_) => ResourceKind::Buffer,
            Self::Texture(_) => ResourceKind::Texture,
            Self::PipelineState(_) => ResourceKind::PipelineState,
            Self::Effect(_) => ResourceKind::Effect,
            Self::Target(_) => ResourceKind::Target,
            Self::DepthBuffer(_) => ResourceKind::DepthBuffer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TablePhase {
    #[default]
    Open,
    Built,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("resource table is already built")]
    AlreadyBuilt,
    #[error("resource table is not built yet")]
    NotBuilt,
    #[error("resource `{name}` is already defined differently")]
    Conflict { name: String },
    #[error("resource `{name}` is not defined")]
    Missing { name: String },
    #[error("external resource `{name}` was never bound")]
    Unbound { name: String },
    #[error("resource `{name}` is a {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: ResourceKind,
        found: ResourceKind,
    },
    #[error("constant `{name}`: expected {expected:?}, found {found:?}")]
    ConstantMismatch {
        name: String,
        expected: ConstantKind,
        found: ConstantKind,
    },
    #[error("failed to create `{name}`: {source}")]
    Creation {
        name: String,
        #[source]
        source: DeviceError,
    },
}

#[derive(Debug)]
pub struct ResourceTable {
    factory: Rc<ResourceFactory>,
    phase: TablePhase,
    definitions: BTreeMap<String, ResourceDesc>,
    bindings: BTreeMap<String, Resource>,
    resources: BTreeMap<String, Resource>,
    constants: BTreeMap<String, ConstantValue>,
}

macro_rules! typed_getter {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self, name: &str) -> Result<Rc<$ty>, TableError> {
            match self.get(name)? {
                Resource::$variant(resource) => Ok(Rc::clone(resource)),
                other => Err(TableError::TypeMismatch {
                    name: name.to_string(),
                    expected: ResourceKind::$variant,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl ResourceTable {
    pub fn new(factory: Rc<ResourceFactory>) -> Self {
        Self {
            factory,
            phase: TablePhase::Open,
            definitions: BTreeMap::new(),
            bindings: BTreeMap::new(),
            resources: BTreeMap::new(),
            constants: BTreeMap::new(),
        }
    }

    pub fn factory(&self) -> &Rc<ResourceFactory> {
        &self.factory
    }

    pub fn phase(&self) -> TablePhase {
        self.phase
    }

    pub fn is_built(&self) -> bool {
        self.phase == TablePhase::Built
    }

    /// Declare `name`. Re-declaring with an identical descriptor is a no-op, so
    /// renderers may share resources by name.
    pub fn define(&mut self, name: impl Into<String>, desc: ResourceDesc) -> Result<(), TableError> {
        if self.is_built() {
            return Err(TableError::AlreadyBuilt);
        }
        let name = name.into();
        match self.definitions.get(&name) {
            Some(existing) if *existing == desc => Ok(()),
            Some(_) => Err(TableError::Conflict { name }),
            None => {
                tracing::trace!(resource = %name, kind = %desc.kind(), "resource defined");
                self.definitions.insert(name, desc);
                Ok(())
            }
        }
    }

    /// Bind an externally created resource to a name declared as
    /// [`ResourceDesc::External`]. Rebinding before build replaces the binding.
    pub fn bind_external(&mut self, name: &str, resource: Resource) -> Result<(), TableError> {
        if self.is_built() {
            return Err(TableError::AlreadyBuilt);
        }
        match self.definitions.get(name) {
            Some(ResourceDesc::External(kind)) if *kind == resource.kind() => {
                self.bindings.insert(name.to_string(), resource);
                Ok(())
            }
            Some(desc) => Err(TableError::TypeMismatch {
                name: name.to_string(),
                expected: desc.kind(),
                found: resource.kind(),
            }),
            None => Err(TableError::Missing {
                name: name.to_string(),
            }),
        }
    }

    /// Allocate every declared resource and freeze the table.
    pub fn build(&mut self) -> Result<(), TableError> {
        if self.is_built() {
            return Err(TableError::AlreadyBuilt);
        }

        let mut ordered: Vec<(&String, &ResourceDesc)> = self.definitions.iter().collect();
        ordered.sort_by_key(|(_, desc)| desc.build_rank());

        let mut resources = BTreeMap::new();
        let mut constants = BTreeMap::new();
        for (name, desc) in ordered {
            match desc {
                ResourceDesc::Constant(kind) => {
                    constants.insert(name.clone(), ConstantValue::zeroed(*kind));
                }
                ResourceDesc::External(_) => {
                    let bound = self.bindings.get(name).ok_or_else(|| TableError::Unbound {
                        name: name.clone(),
                    })?;
                    resources.insert(name.clone(), bound.clone());
                }
                _ => {
                    let created =
                        self.factory
                            .create(desc)
                            .map_err(|source| TableError::Creation {
                                name: name.clone(),
                                source,
                            })?;
                    resources.insert(name.clone(), created);
                }
            }
        }

        tracing::debug!(
            resources = resources.len(),
            constants = constants.len(),
            "resource table built"
        );
        self.resources = resources;
        self.constants = constants;
        self.phase = TablePhase::Built;
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Number of declared entries.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<&Resource, TableError> {
        if !self.is_built() {
            return Err(TableError::NotBuilt);
        }
        self.resources.get(name).ok_or_else(|| TableError::Missing {
            name: name.to_string(),
        })
    }

    typed_getter!(buffer, Buffer, Buffer);
    typed_getter!(texture, Texture, Texture);
    typed_getter!(pipeline_state, PipelineState, PipelineState);
    typed_getter!(effect, Effect, Effect);
    typed_getter!(target, Target, Target);
    typed_getter!(depth_buffer, DepthBuffer, DepthBuffer);

    pub fn constant(&self, name: &str) -> Result<ConstantValue, TableError> {
        if !self.is_built() {
            return Err(TableError::NotBuilt);
        }
        self.constants
            .get(name)
            .copied()
            .ok_or_else(|| self.absent(name, ResourceKind::Constant))
    }

    /// Read a `Mat4` constant.
    pub fn matrix(&self, name: &str) -> Result<Mat4, TableError> {
        match self.constant(name)? {
            ConstantValue::Mat4(m) => Ok(m),
            other => Err(TableError::ConstantMismatch {
                name: name.to_string(),
                expected: ConstantKind::Mat4,
                found: other.kind(),
            }),
        }
    }

    pub fn set_constant(&mut self, name: &str, value: ConstantValue) -> Result<(), TableError> {
        if !self.is_built() {
            return Err(TableError::NotBuilt);
        }
        let Some(slot) = self.constants.get_mut(name) else {
            return Err(self.absent(name, ResourceKind::Constant));
        };
        if slot.kind() != value.kind() {
            return Err(TableError::ConstantMismatch {
                name: name.to_string(),
                expected: slot.kind(),
                found: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// Error for a name with no entry of the requested category.
    fn absent(&self, name: &str, expected: ResourceKind) -> TableError {
        match self.definitions.get(name) {
            Some(desc) => TableError::TypeMismatch {
                name: name.to_string(),
                expected,
                found: desc.kind(),
            },
            None => TableError::Missing {
                name: name.to_string(),
            },
        }
    }
}
