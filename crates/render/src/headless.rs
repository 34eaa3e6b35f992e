//! Headless reference backend.
//!
//! Implements [`Device`] for either variant without touching a GPU. Every call
//! is validated and appended to a command log, which makes it the backend of
//! choice for the CLI and for tests that assert on frame ordering.

use crate::device::{Device, DeviceError, DeviceType};
use crate::resource::*;
use prism_common::Color;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    Initialize,
    CreateTarget { handle: ResourceHandle, desc: TargetDesc },
    CreateDepthBuffer { handle: ResourceHandle, desc: DepthBufferDesc },
    CreateBuffer { handle: ResourceHandle, size: u64 },
    CreateTexture { handle: ResourceHandle },
    CreatePipelineState { handle: ResourceHandle, effect: String },
    CompileEffect { handle: ResourceHandle, name: String },
    UpdateBuffer { handle: ResourceHandle, offset: u64, len: usize },
    ClearTarget { handle: ResourceHandle, color: Color },
    ClearDepthBuffer {
        handle: ResourceHandle,
        depth: f32,
        stencil: u8,
        flags: ClearFlags,
    },
    DrawIndexed {
        pipeline: ResourceHandle,
        index_count: u32,
        start_index: u32,
    },
    Present { handle: ResourceHandle, sync_interval: u32 },
    Flush,
}

/// In-memory device that records instead of rendering.
#[derive(Debug)]
pub struct HeadlessDevice {
    device_type: DeviceType,
    initialized: Cell<bool>,
    next_handle: Cell<u64>,
    buffer_sizes: RefCell<BTreeMap<ResourceHandle, u64>>,
    faults: RefCell<BTreeSet<ResourceKind>>,
    log: RefCell<Vec<DeviceCommand>>,
}

impl HeadlessDevice {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            initialized: Cell::new(false),
            next_handle: Cell::new(1),
            buffer_sizes: RefCell::new(BTreeMap::new()),
            faults: RefCell::new(BTreeSet::new()),
            log: RefCell::new(Vec::new()),
        }
    }

    /// Make every later creation of `kind` fail.
    pub fn fail_on(&self, kind: ResourceKind) {
        self.faults.borrow_mut().insert(kind);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Snapshot of the command log.
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.log.borrow().clone()
    }

    /// Drain the command log.
    pub fn take_commands(&self) -> Vec<DeviceCommand> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn present_count(&self) -> usize {
        self.count(|c| matches!(c, DeviceCommand::Present { .. }))
    }

    pub fn draw_count(&self) -> usize {
        self.count(|c| matches!(c, DeviceCommand::DrawIndexed { .. }))
    }

    fn count(&self, pred: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.log.borrow().iter().filter(|c| pred(*c)).count()
    }

    fn record(&self, command: DeviceCommand) {
        tracing::trace!(device = %self.device_type, ?command, "headless command");
        self.log.borrow_mut().push(command);
    }

    fn allocate(&self) -> ResourceHandle {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        ResourceHandle(raw)
    }

    /// Shared preconditions for every creation call.
    fn admit(&self, kind: ResourceKind) -> Result<(), DeviceError> {
        if !self.initialized.get() {
            return Err(DeviceError::NotInitialized);
        }
        if self.faults.borrow().contains(&kind) {
            return Err(DeviceError::CreationFailed {
                kind,
                reason: "injected fault".into(),
            });
        }
        Ok(())
    }
}

fn check_surface(
    kind: ResourceKind,
    width: u32,
    height: u32,
    sample_count: u32,
) -> Result<(), DeviceError> {
    let invalid = |reason: String| DeviceError::InvalidDescriptor { kind, reason };
    if width == 0 || height == 0 {
        return Err(invalid(format!("zero-sized surface {width}x{height}")));
    }
    if sample_count == 0 {
        return Err(invalid("sample count must be at least 1".into()));
    }
    Ok(())
}

impl Device for HeadlessDevice {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn initialize(&self) -> Result<(), DeviceError> {
        if self.initialized.replace(true) {
            return Err(DeviceError::Initialization("already initialized".into()));
        }
        self.record(DeviceCommand::Initialize);
        Ok(())
    }

    fn create_target(&self, desc: &TargetDesc) -> Result<Rc<Target>, DeviceError> {
        self.admit(ResourceKind::Target)?;
        check_surface(ResourceKind::Target, desc.width, desc.height, desc.sample_count)?;
        if desc.format.is_depth() {
            return Err(DeviceError::InvalidDescriptor {
                kind: ResourceKind::Target,
                reason: format!("{:?} is a depth format", desc.format),
            });
        }
        let handle = self.allocate();
        self.record(DeviceCommand::CreateTarget {
            handle,
            desc: *desc,
        });
        Ok(Rc::new(Target::new(handle, *desc)))
    }

    fn create_depth_buffer(&self, desc: &DepthBufferDesc) -> Result<Rc<DepthBuffer>, DeviceError> {
        self.admit(ResourceKind::DepthBuffer)?;
        check_surface(
            ResourceKind::DepthBuffer,
            desc.width,
            desc.height,
            desc.sample_count,
        )?;
        if !desc.format.is_depth() {
            return Err(DeviceError::InvalidDescriptor {
                kind: ResourceKind::DepthBuffer,
                reason: format!("{:?} is not a depth format", desc.format),
            });
        }
        let handle = self.allocate();
        self.record(DeviceCommand::CreateDepthBuffer {
            handle,
            desc: *desc,
        });
        Ok(Rc::new(DepthBuffer::new(handle, *desc)))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Rc<Buffer>, DeviceError> {
        self.admit(ResourceKind::Buffer)?;
        if desc.size == 0 {
            return Err(DeviceError::InvalidDescriptor {
                kind: ResourceKind::Buffer,
                reason: "zero-sized buffer".into(),
            });
        }
        let handle = self.allocate();
        self.buffer_sizes.borrow_mut().insert(handle, desc.size);
        self.record(DeviceCommand::CreateBuffer {
            handle,
            size: desc.size,
        });
        Ok(Rc::new(Buffer::new(handle, *desc)))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Rc<Texture>, DeviceError> {
        self.admit(ResourceKind::Texture)?;
        check_surface(ResourceKind::Texture, desc.width, desc.height, 1)?;
        if desc.mip_levels == 0 {
            return Err(DeviceError::InvalidDescriptor {
                kind: ResourceKind::Texture,
                reason: "mip level count must be at least 1".into(),
            });
        }
        let handle = self.allocate();
        self.record(DeviceCommand::CreateTexture { handle });
        Ok(Rc::new(Texture::new(handle, *desc)))
    }

    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDesc,
        effect: &Effect,
    ) -> Result<Rc<PipelineState>, DeviceError> {
        self.admit(ResourceKind::PipelineState)?;
        if effect.name() != desc.effect {
            return Err(DeviceError::InvalidDescriptor {
                kind: ResourceKind::PipelineState,
                reason: format!(
                    "descriptor names effect `{}` but `{}` was supplied",
                    desc.effect,
                    effect.name()
                ),
            });
        }
        let handle = self.allocate();
        self.record(DeviceCommand::CreatePipelineState {
            handle,
            effect: desc.effect.clone(),
        });
        Ok(Rc::new(PipelineState::new(handle, desc.clone())))
    }

    fn compile_effect(&self, desc: &EffectDesc) -> Result<Rc<Effect>, DeviceError> {
        self.admit(ResourceKind::Effect)?;
        for entry in [&desc.vertex_entry, &desc.pixel_entry] {
            if !desc.source.contains(entry.as_str()) {
                return Err(DeviceError::EffectCompilation {
                    name: desc.name.clone(),
                    reason: format!("entry point `{entry}` not found"),
                });
            }
        }
        let handle = self.allocate();
        self.record(DeviceCommand::CompileEffect {
            handle,
            name: desc.name.clone(),
        });
        Ok(Rc::new(Effect::new(desc.name.clone(), handle)))
    }

    fn update_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let size = self
            .buffer_sizes
            .borrow()
            .get(&buffer.handle())
            .copied()
            .ok_or_else(|| DeviceError::InvalidDescriptor {
                kind: ResourceKind::Buffer,
                reason: format!("{:?} was not created by this device", buffer.handle()),
            })?;
        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > size) {
            return Err(DeviceError::InvalidDescriptor {
                kind: ResourceKind::Buffer,
                reason: format!(
                    "write of {} bytes at offset {offset} overflows {size}-byte buffer",
                    data.len()
                ),
            });
        }
        self.record(DeviceCommand::UpdateBuffer {
            handle: buffer.handle(),
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn clear_target(&self, target: &Target, color: Color) {
        self.record(DeviceCommand::ClearTarget {
            handle: target.handle(),
            color,
        });
    }

    fn clear_depth_buffer(&self, buffer: &DepthBuffer, depth: f32, stencil: u8, flags: ClearFlags) {
        self.record(DeviceCommand::ClearDepthBuffer {
            handle: buffer.handle(),
            depth,
            stencil,
            flags,
        });
    }

    fn draw_indexed(&self, pipeline: &PipelineState, index_count: u32, start_index: u32) {
        self.record(DeviceCommand::DrawIndexed {
            pipeline: pipeline.handle(),
            index_count,
            start_index,
        });
    }

    fn present(&self, target: &Target, sync_interval: u32) -> Result<(), DeviceError> {
        if !self.initialized.get() {
            return Err(DeviceError::NotInitialized);
        }
        self.record(DeviceCommand::Present {
            handle: target.handle(),
            sync_interval,
        });
        Ok(())
    }

    fn flush(&self) {
        self.record(DeviceCommand::Flush);
    }
}
