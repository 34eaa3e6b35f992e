use crate::context::DrawingContext;
use crate::device::Device;
use crate::system::DrawingError;
use crate::table::{ResourceTable, TableError};
use prism_common::{Mesh, RendererType};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

/// A rendering technique.
///
/// Setup runs once per instance and session, even when one instance serves
/// several renderer types, in this order: [`attach_device`](Self::attach_device),
/// [`define_resources`](Self::define_resources), [`setup_stages`](Self::setup_stages),
/// then after the resource table is built
/// [`create_data_resources`](Self::create_data_resources) and
/// [`map_resources`](Self::map_resources). [`detach`](Self::detach) ends the
/// session; a later `attach_device` starts a new one on a different device.
///
/// Every frame, for every mesh a camera sees, the drawing system runs the
/// draw-pass protocol `begin_draw_pass → attach_mesh → flush_data → draw →
/// reset_data → end_draw_pass`. `reset_data` and `end_draw_pass` run even
/// when `flush_data` or `draw` fails.
///
/// A renderer never mutates scene state; everything it needs arrives through
/// the attached mesh and the resource table.
pub trait Renderer: std::fmt::Debug {
    fn attach_device(&mut self, device: Rc<dyn Device>, context: Rc<DrawingContext>);

    /// Drop the device, context and every handle created from them. Called on
    /// shutdown and when initialization aborts after `attach_device`.
    fn detach(&mut self);

    /// Declare the named resources this renderer needs.
    fn define_resources(&mut self, table: &mut ResourceTable) -> Result<(), TableError>;

    fn setup_stages(&mut self);

    /// Create per-renderer resources that live outside the table.
    fn create_data_resources(&mut self, table: &ResourceTable) -> Result<(), DrawingError>;

    /// Resolve table entries into the handles used while drawing.
    fn map_resources(&mut self, table: &ResourceTable) -> Result<(), DrawingError>;

    fn begin_draw_pass(&mut self);

    fn attach_mesh(&mut self, mesh: &Arc<Mesh>);

    /// Upload data staged by `attach_mesh`.
    fn flush_data(&mut self) -> Result<(), DrawingError>;

    fn draw(&mut self, table: &ResourceTable) -> Result<(), DrawingError>;

    fn reset_data(&mut self);

    fn end_draw_pass(&mut self);
}

pub type SharedRenderer = Rc<RefCell<dyn Renderer>>;

/// Renderer instances supplied by the host, keyed by technique.
///
/// One instance may serve several renderer types.
#[derive(Debug, Default)]
pub struct RendererCatalog {
    renderers: BTreeMap<RendererType, SharedRenderer>,
}

impl RendererCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `renderer` for `ty` and return a typed handle to it.
    pub fn register<R: Renderer + 'static>(&mut self, ty: RendererType, renderer: R) -> Rc<RefCell<R>> {
        let shared = Rc::new(RefCell::new(renderer));
        self.insert(ty, shared.clone());
        shared
    }

    /// Register an existing shared instance, replacing any previous one for `ty`.
    pub fn insert(&mut self, ty: RendererType, renderer: SharedRenderer) -> Option<SharedRenderer> {
        self.renderers.insert(ty, renderer)
    }

    pub fn get(&self, ty: RendererType) -> Option<&SharedRenderer> {
        self.renderers.get(&ty)
    }

    pub fn contains(&self, ty: RendererType) -> bool {
        self.renderers.contains_key(&ty)
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = RendererType> + '_ {
        self.renderers.keys().copied()
    }
}
