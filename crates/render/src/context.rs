//! Per-session rendering state shared by the drawing system and renderers.
//!
//! The context owns the active swap chain, depth buffer and viewport, and is
//! the only writer of the frame, camera and transform constants it declares
//! into the resource table.

use crate::device::Device;
use crate::resource::{DepthBuffer, ResourceKind, Target, Viewport};
use crate::system::DrawingError;
use crate::table::{ConstantKind, ConstantValue, Resource, ResourceDesc, ResourceTable, TableError};
use glam::{Mat4, Vec4};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub const SCREEN_TARGET: &str = "ScreenTarget";
pub const SCREEN_DEPTH_BUFFER: &str = "ScreenDepthBuffer";

/// `(x, y, width, height)` of the active viewport.
pub const VIEWPORT: &str = "gViewport";
/// `(total seconds, delta seconds, frame number, 0)`.
pub const TIME: &str = "gTime";
pub const VIEW: &str = "gView";
pub const PROJECTION: &str = "gProjection";
/// `projection * view`.
pub const VIEW_PROJECTION: &str = "gViewProjection";
pub const WORLD: &str = "gWorld";

/// Frame clock advanced once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    pub frame: u64,
    pub delta: f32,
    pub total: f32,
}

#[derive(Debug)]
pub struct DrawingContext {
    device: Rc<dyn Device>,
    swap_chain: RefCell<Option<Rc<Target>>>,
    depth_buffer: RefCell<Option<Rc<DepthBuffer>>>,
    viewport: Cell<Viewport>,
    time: Cell<FrameTime>,
}

impl DrawingContext {
    pub fn new(device: Rc<dyn Device>) -> Self {
        Self {
            device,
            swap_chain: RefCell::new(None),
            depth_buffer: RefCell::new(None),
            viewport: Cell::new(Viewport::default()),
            time: Cell::new(FrameTime::default()),
        }
    }

    pub fn device(&self) -> &Rc<dyn Device> {
        &self.device
    }

    pub fn set_swap_chain(&self, target: Rc<Target>) {
        self.swap_chain.replace(Some(target));
    }

    pub fn swap_chain(&self) -> Option<Rc<Target>> {
        self.swap_chain.borrow().clone()
    }

    pub fn set_depth_buffer(&self, buffer: Rc<DepthBuffer>) {
        self.depth_buffer.replace(Some(buffer));
    }

    pub fn depth_buffer(&self) -> Option<Rc<DepthBuffer>> {
        self.depth_buffer.borrow().clone()
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.viewport.set(viewport);
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport.get()
    }

    pub fn time(&self) -> FrameTime {
        self.time.get()
    }

    /// Step the frame clock by `elapsed` seconds.
    pub fn advance(&self, elapsed: f32) -> FrameTime {
        let prev = self.time.get();
        let next = FrameTime {
            frame: prev.frame + 1,
            delta: elapsed,
            total: prev.total + elapsed,
        };
        self.time.set(next);
        next
    }

    /// Declare the screen targets and the constants this context writes.
    pub fn define_resources(&self, table: &mut ResourceTable) -> Result<(), TableError> {
        table.define(SCREEN_TARGET, ResourceDesc::External(ResourceKind::Target))?;
        table.define(
            SCREEN_DEPTH_BUFFER,
            ResourceDesc::External(ResourceKind::DepthBuffer),
        )?;
        for name in [VIEWPORT, TIME] {
            table.define(name, ResourceDesc::Constant(ConstantKind::Vec4))?;
        }
        for name in [VIEW, PROJECTION, VIEW_PROJECTION, WORLD] {
            table.define(name, ResourceDesc::Constant(ConstantKind::Mat4))?;
        }
        Ok(())
    }

    /// Bind the current swap chain and depth buffer into the table.
    pub fn update_targets(&self, table: &mut ResourceTable) -> Result<(), DrawingError> {
        let target = self
            .swap_chain()
            .ok_or(DrawingError::MissingTarget(SCREEN_TARGET))?;
        let depth = self
            .depth_buffer()
            .ok_or(DrawingError::MissingTarget(SCREEN_DEPTH_BUFFER))?;
        table.bind_external(SCREEN_TARGET, Resource::Target(target))?;
        table.bind_external(SCREEN_DEPTH_BUFFER, Resource::DepthBuffer(depth))?;
        Ok(())
    }

    /// Push frame-global constants (viewport and clock).
    pub fn update_context(&self, table: &mut ResourceTable) -> Result<(), TableError> {
        let vp = self.viewport();
        let time = self.time();
        table.set_constant(
            VIEWPORT,
            ConstantValue::Vec4(Vec4::new(vp.x, vp.y, vp.width, vp.height)),
        )?;
        table.set_constant(
            TIME,
            ConstantValue::Vec4(Vec4::new(time.total, time.delta, time.frame as f32, 0.0)),
        )
    }

    pub fn update_camera(
        &self,
        table: &mut ResourceTable,
        projection: Mat4,
        view: Mat4,
    ) -> Result<(), TableError> {
        table.set_constant(VIEW, ConstantValue::Mat4(view))?;
        table.set_constant(PROJECTION, ConstantValue::Mat4(projection))?;
        table.set_constant(VIEW_PROJECTION, ConstantValue::Mat4(projection * view))
    }

    pub fn update_transform(&self, table: &mut ResourceTable, world: Mat4) -> Result<(), TableError> {
        table.set_constant(WORLD, ConstantValue::Mat4(world))
    }
}
