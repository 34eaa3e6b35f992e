//! The drawing system: owns the device and its dependents, tracks which scene
//! entities are cameras and meshes, and turns them into a presented frame.
//!
//! # Invariants
//!
//! - Device, context, effect pool, factory, table and renderer registry are
//!   created in that order by [`DrawingSystem::initialize`] and live together
//!   in one session; a failed stage leaves no session behind.
//! - The resource table is built before the first [`DrawingSystem::tick`].
//! - Each tick presents exactly once, after every camera has been processed.

use crate::config::{AppConfig, ConfigError, EngineConfig, GraphicsConfig};
use crate::context::{DrawingContext, SCREEN_DEPTH_BUFFER, SCREEN_TARGET};
use crate::device::{Device, DeviceCatalog, DeviceError, DeviceType};
use crate::effect::EffectPool;
use crate::factory::ResourceFactory;
use crate::math::{projection_matrix, view_matrix, world_matrix};
use crate::renderer::{RendererCatalog, SharedRenderer};
use crate::resource::{ClearFlags, DepthBufferDesc, PixelFormat, TargetDesc, Viewport};
use crate::table::{ResourceTable, TableError};
use prism_common::{EntityId, RendererType, Transform};
use prism_ecs::{Camera, ComponentStore, MeshFilter};
use std::collections::BTreeMap;
use std::rc::Rc;

pub const SWAP_CHAIN_FORMAT: PixelFormat = PixelFormat::R8G8B8A8Unorm;
pub const DEPTH_FORMAT: PixelFormat = PixelFormat::D24UnormS8Uint;

#[derive(Debug, thiserror::Error)]
pub enum DrawingError {
    #[error("no configuration supplied")]
    MissingConfiguration,
    #[error("no backend registered for device type {0}")]
    UnsupportedDevice(DeviceType),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("drawing system is not ready")]
    NotReady,
    #[error("drawing system is already initialized")]
    AlreadyInitialized,
    #[error("render target `{0}` is not set")]
    MissingTarget(&'static str),
    #[error("renderer error: {0}")]
    Renderer(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    #[default]
    Uninitialized,
    Ready,
    /// The last `initialize` aborted; calling it again may succeed.
    Failed,
}

/// Initialization stages, run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    PreConfiguration,
    CreateDevice,
    CreatePreResource,
    RegisterRenderers,
    PostConfiguration,
}

impl std::fmt::Display for InitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PreConfiguration => "pre-configuration",
            Self::CreateDevice => "create-device",
            Self::CreatePreResource => "create-pre-resource",
            Self::RegisterRenderers => "register-renderers",
            Self::PostConfiguration => "post-configuration",
        };
        f.write_str(name)
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Cameras whose targets were cleared.
    pub cameras: usize,
    /// Cameras that issued no draws: no renderer for their type, or the
    /// entity lost its camera components.
    pub cameras_skipped: usize,
    /// Completed draw-pass protocols.
    pub draw_calls: usize,
    /// Camera/mesh pairs skipped because the mesh entity lost its components.
    pub meshes_skipped: usize,
}

/// Everything created by a successful `initialize`.
#[derive(Debug)]
struct Session {
    app: AppConfig,
    graphics: GraphicsConfig,
    device: Rc<dyn Device>,
    context: Rc<DrawingContext>,
    effects: Rc<EffectPool>,
    factory: Rc<ResourceFactory>,
    table: ResourceTable,
    renderers: BTreeMap<RendererType, SharedRenderer>,
}

#[derive(Debug)]
pub struct DrawingSystem {
    device_type: DeviceType,
    state: SystemState,
    session: Option<Session>,
    cameras: Vec<EntityId>,
    meshes: Vec<EntityId>,
}

impl DrawingSystem {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            state: SystemState::Uninitialized,
            session: None,
            cameras: Vec::new(),
            meshes: Vec::new(),
        }
    }

    /// System using the backend named by `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.graphics.device)
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Select the backend. Ignored once the system is initialized.
    pub fn set_device_type(&mut self, device_type: DeviceType) {
        if self.session.is_some() {
            tracing::warn!(
                current = %self.device_type,
                requested = %device_type,
                "device type change ignored while initialized"
            );
            return;
        }
        self.device_type = device_type;
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SystemState::Ready
    }

    /// Run the initialization pipeline.
    ///
    /// Stages gate each other; the first failure aborts the rest, leaves the
    /// system [`SystemState::Failed`] and is returned.
    pub fn initialize(
        &mut self,
        config: Option<&EngineConfig>,
        devices: &DeviceCatalog,
        renderers: &RendererCatalog,
    ) -> Result<(), DrawingError> {
        let _span = tracing::info_span!("initialize", device = %self.device_type).entered();
        if self.session.is_some() {
            return Err(DrawingError::AlreadyInitialized);
        }

        match self.establish(config, devices, renderers) {
            Ok(session) => {
                tracing::info!(
                    width = session.app.width,
                    height = session.app.height,
                    renderers = session.renderers.len(),
                    "drawing system ready"
                );
                self.session = Some(session);
                self.state = SystemState::Ready;
                Ok(())
            }
            Err((stage, err)) => {
                tracing::warn!(%stage, error = %err, "drawing system initialization failed");
                self.state = SystemState::Failed;
                Err(err)
            }
        }
    }

    fn establish(
        &self,
        config: Option<&EngineConfig>,
        devices: &DeviceCatalog,
        catalog: &RendererCatalog,
    ) -> Result<Session, (InitStage, DrawingError)> {
        let at = |stage: InitStage| move |err: DrawingError| (stage, err);

        let (app, graphics) = pre_configuration(config).map_err(at(InitStage::PreConfiguration))?;
        let (device, context) =
            create_device(self.device_type, devices).map_err(at(InitStage::CreateDevice))?;
        let (effects, factory, mut table) =
            create_pre_resource(&device, &context).map_err(at(InitStage::CreatePreResource))?;
        let renderers = collect_renderers(catalog);
        let staged = register_renderers(&renderers, &device, &context, &mut table)
            .map_err(at(InitStage::RegisterRenderers))
            .and_then(|()| {
                post_configuration(&app, &graphics, &device, &context, &mut table, &renderers)
                    .map_err(at(InitStage::PostConfiguration))
            });
        if let Err(failure) = staged {
            detach_all(&renderers);
            return Err(failure);
        }

        Ok(Session {
            app,
            graphics,
            device,
            context,
            effects,
            factory,
            table,
            renderers,
        })
    }

    /// Detach every renderer and release the registry and every backend object. Entity lists
    /// are kept; see [`clear_entities`](Self::clear_entities).
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            detach_all(&session.renderers);
            tracing::info!(renderers = session.renderers.len(), "drawing system shut down");
        }
        self.state = SystemState::Uninitialized;
    }

    /// Sort `entity` into the camera and/or mesh list.
    ///
    /// Lists are not de-duplicated: flushing the same entity twice renders it
    /// twice.
    pub fn flush_entity(&mut self, scene: &ComponentStore, entity: EntityId) {
        let placed = scene.has::<Transform>(entity);
        if placed && scene.has::<Camera>(entity) {
            self.cameras.push(entity);
        }
        if placed && scene.has::<MeshFilter>(entity) {
            self.meshes.push(entity);
        }
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn clear_entities(&mut self) {
        self.cameras.clear();
        self.meshes.clear();
    }

    /// Render and present one frame.
    ///
    /// For every camera: push frame and camera constants, clear the screen
    /// targets, then run the camera's renderer over every mesh. A renderer
    /// failure still closes its pass (`reset_data`, `end_draw_pass`) before
    /// the error is returned.
    pub fn tick(&mut self, scene: &ComponentStore, elapsed: f32) -> Result<FrameStats, DrawingError> {
        let Some(session) = self.session.as_mut() else {
            return Err(DrawingError::NotReady);
        };
        let time = session.context.advance(elapsed);
        let _span = tracing::info_span!("tick", frame = time.frame).entered();

        let swap_chain = session
            .context
            .swap_chain()
            .ok_or(DrawingError::MissingTarget(SCREEN_TARGET))?;
        let depth_buffer = session
            .context
            .depth_buffer()
            .ok_or(DrawingError::MissingTarget(SCREEN_DEPTH_BUFFER))?;
        let aspect = session.app.aspect_ratio();
        let mut stats = FrameStats::default();

        for &camera_id in &self.cameras {
            let (Some(camera), Some(eye)) = (
                scene.get::<Camera>(camera_id),
                scene.get::<Transform>(camera_id),
            ) else {
                tracing::debug!(?camera_id, "camera entity lost its components");
                stats.cameras_skipped += 1;
                continue;
            };
            stats.cameras += 1;

            let projection = projection_matrix(camera.fov, camera.near, camera.far, aspect);
            let view = view_matrix(eye.position);
            session.context.update_context(&mut session.table)?;
            session
                .context
                .update_camera(&mut session.table, projection, view)?;

            session.device.clear_target(&swap_chain, camera.background);
            session
                .device
                .clear_depth_buffer(&depth_buffer, 1.0, 0, ClearFlags::DEPTH);

            let Some(renderer) = session.renderers.get(&camera.renderer).cloned() else {
                tracing::debug!(renderer = %camera.renderer, "no renderer registered, pass skipped");
                stats.cameras_skipped += 1;
                continue;
            };

            for &mesh_id in &self.meshes {
                let (Some(transform), Some(filter)) = (
                    scene.get::<Transform>(mesh_id),
                    scene.get::<MeshFilter>(mesh_id),
                ) else {
                    stats.meshes_skipped += 1;
                    continue;
                };

                session
                    .context
                    .update_transform(&mut session.table, world_matrix(transform))?;

                let mut pass = renderer.borrow_mut();
                pass.begin_draw_pass();
                pass.attach_mesh(&filter.mesh);
                let drawn = pass.flush_data().and_then(|()| pass.draw(&session.table));
                pass.reset_data();
                pass.end_draw_pass();
                drawn?;

                stats.draw_calls += 1;
                tracing::trace!(mesh = %filter.mesh.name, renderer = %camera.renderer, "mesh drawn");
            }
        }

        session.device.present(&swap_chain, 0)?;
        Ok(stats)
    }

    pub fn device(&self) -> Option<&Rc<dyn Device>> {
        self.session.as_ref().map(|s| &s.device)
    }

    pub fn context(&self) -> Option<&Rc<DrawingContext>> {
        self.session.as_ref().map(|s| &s.context)
    }

    pub fn effect_pool(&self) -> Option<&Rc<EffectPool>> {
        self.session.as_ref().map(|s| &s.effects)
    }

    pub fn factory(&self) -> Option<&Rc<ResourceFactory>> {
        self.session.as_ref().map(|s| &s.factory)
    }

    pub fn table(&self) -> Option<&ResourceTable> {
        self.session.as_ref().map(|s| &s.table)
    }

    pub fn app_config(&self) -> Option<&AppConfig> {
        self.session.as_ref().map(|s| &s.app)
    }

    pub fn graphics_config(&self) -> Option<&GraphicsConfig> {
        self.session.as_ref().map(|s| &s.graphics)
    }

    pub fn renderer(&self, ty: RendererType) -> Option<&SharedRenderer> {
        self.session.as_ref()?.renderers.get(&ty)
    }

    pub fn renderer_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.renderers.len())
    }
}

fn pre_configuration(
    config: Option<&EngineConfig>,
) -> Result<(AppConfig, GraphicsConfig), DrawingError> {
    tracing::debug!(stage = %InitStage::PreConfiguration);
    let config = config.ok_or(DrawingError::MissingConfiguration)?;
    config.validate()?;
    Ok((config.app, config.graphics))
}

fn create_device(
    device_type: DeviceType,
    devices: &DeviceCatalog,
) -> Result<(Rc<dyn Device>, Rc<DrawingContext>), DrawingError> {
    tracing::debug!(stage = %InitStage::CreateDevice, device = %device_type);
    let device = devices
        .create(device_type)
        .ok_or(DrawingError::UnsupportedDevice(device_type))?;
    device.initialize()?;
    let context = Rc::new(DrawingContext::new(device.clone()));
    Ok((device, context))
}

fn create_pre_resource(
    device: &Rc<dyn Device>,
    context: &DrawingContext,
) -> Result<(Rc<EffectPool>, Rc<ResourceFactory>, ResourceTable), DrawingError> {
    tracing::debug!(stage = %InitStage::CreatePreResource);
    let effects = Rc::new(EffectPool::new(device.clone()));
    let factory = Rc::new(ResourceFactory::new(device.clone(), effects.clone()));
    let mut table = ResourceTable::new(factory.clone());
    context.define_resources(&mut table)?;
    Ok((effects, factory, table))
}

/// Catalog entries for every known renderer type, in type order.
fn collect_renderers(catalog: &RendererCatalog) -> BTreeMap<RendererType, SharedRenderer> {
    RendererType::all()
        .filter_map(|ty| catalog.get(ty).map(|shared| (ty, shared.clone())))
        .collect()
}

/// Each shared instance once, in the order of its first renderer type.
fn distinct(renderers: &BTreeMap<RendererType, SharedRenderer>) -> Vec<&SharedRenderer> {
    let mut unique: Vec<&SharedRenderer> = Vec::new();
    for renderer in renderers.values() {
        if !unique.iter().any(|seen| Rc::ptr_eq(seen, renderer)) {
            unique.push(renderer);
        }
    }
    unique
}

fn detach_all(renderers: &BTreeMap<RendererType, SharedRenderer>) {
    for renderer in distinct(renderers) {
        renderer.borrow_mut().detach();
    }
}

fn register_renderers(
    renderers: &BTreeMap<RendererType, SharedRenderer>,
    device: &Rc<dyn Device>,
    context: &Rc<DrawingContext>,
    table: &mut ResourceTable,
) -> Result<(), DrawingError> {
    tracing::debug!(stage = %InitStage::RegisterRenderers);
    for shared in distinct(renderers) {
        let mut renderer = shared.borrow_mut();
        renderer.attach_device(device.clone(), context.clone());
        renderer.define_resources(table)?;
        renderer.setup_stages();
    }
    tracing::debug!(
        types = renderers.len(),
        instances = distinct(renderers).len(),
        "renderers registered"
    );
    Ok(())
}

fn post_configuration(
    app: &AppConfig,
    graphics: &GraphicsConfig,
    device: &Rc<dyn Device>,
    context: &DrawingContext,
    table: &mut ResourceTable,
    renderers: &BTreeMap<RendererType, SharedRenderer>,
) -> Result<(), DrawingError> {
    tracing::debug!(stage = %InitStage::PostConfiguration);
    let sample_count = graphics.msaa.sample_count();
    let sample_quality = graphics.msaa.sample_quality();

    let swap_chain = device.create_target(&TargetDesc {
        window: app.window,
        width: app.width,
        height: app.height,
        format: SWAP_CHAIN_FORMAT,
        sample_count,
        sample_quality,
    })?;
    let depth_buffer = device.create_depth_buffer(&DepthBufferDesc {
        width: app.width,
        height: app.height,
        format: DEPTH_FORMAT,
        sample_count,
        sample_quality,
    })?;

    context.set_swap_chain(swap_chain);
    context.set_depth_buffer(depth_buffer);
    context.set_viewport(Viewport::full(app.width, app.height));
    context.update_targets(table)?;

    table.build()?;
    device.flush();

    for renderer in distinct(renderers) {
        renderer.borrow_mut().create_data_resources(table)?;
    }
    for renderer in distinct(renderers) {
        renderer.borrow_mut().map_resources(table)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Msaa;
    use crate::context::{VIEW_PROJECTION, WORLD};
    use crate::debug::DebugRenderer;
    use crate::headless::{DeviceCommand, HeadlessDevice};
    use crate::renderer::Renderer;
    use crate::resource::ResourceKind;
    use glam::{Mat4, Vec3};
    use prism_common::Mesh;
    use std::cell::RefCell;
    use std::sync::Arc;

    type Slot = Rc<RefCell<Option<Rc<HeadlessDevice>>>>;

    /// Headless catalog that hands the created device back to the test.
    fn headless_catalog() -> (DeviceCatalog, Slot) {
        let slot: Slot = Rc::new(RefCell::new(None));
        let mut catalog = DeviceCatalog::new();
        for ty in DeviceType::ALL {
            let slot = slot.clone();
            catalog.register(ty, move |ty| {
                let device = Rc::new(HeadlessDevice::new(ty));
                *slot.borrow_mut() = Some(device.clone());
                device as Rc<dyn Device>
            });
        }
        (catalog, slot)
    }

    fn config(width: u32, height: u32) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.app.width = width;
        config.app.height = height;
        config
    }

    /// Renderer that logs every call into a shared journal.
    #[derive(Debug)]
    struct Recorder {
        label: &'static str,
        journal: Rc<RefCell<Vec<String>>>,
        worlds: Vec<Mat4>,
        fail_flush: bool,
    }

    impl Recorder {
        fn new(label: &'static str, journal: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                label,
                journal: journal.clone(),
                worlds: Vec::new(),
                fail_flush: false,
            }
        }

        fn log(&self, call: &str) {
            self.journal
                .borrow_mut()
                .push(format!("{}:{call}", self.label));
        }
    }

    impl Renderer for Recorder {
        fn attach_device(&mut self, _device: Rc<dyn Device>, _context: Rc<DrawingContext>) {
            self.log("attach_device");
        }

        fn detach(&mut self) {
            self.log("detach");
        }

        fn define_resources(&mut self, _table: &mut ResourceTable) -> Result<(), TableError> {
            self.log("define_resources");
            Ok(())
        }

        fn setup_stages(&mut self) {
            self.log("setup_stages");
        }

        fn create_data_resources(&mut self, table: &ResourceTable) -> Result<(), DrawingError> {
            assert!(table.is_built());
            self.log("create_data_resources");
            Ok(())
        }

        fn map_resources(&mut self, _table: &ResourceTable) -> Result<(), DrawingError> {
            self.log("map_resources");
            Ok(())
        }

        fn begin_draw_pass(&mut self) {
            self.log("begin");
        }

        fn attach_mesh(&mut self, _mesh: &Arc<Mesh>) {
            self.log("attach");
        }

        fn flush_data(&mut self) -> Result<(), DrawingError> {
            self.log("flush");
            if self.fail_flush {
                return Err(DrawingError::Renderer("flush refused".into()));
            }
            Ok(())
        }

        fn draw(&mut self, table: &ResourceTable) -> Result<(), DrawingError> {
            self.log("draw");
            self.worlds.push(table.matrix(WORLD)?);
            Ok(())
        }

        fn reset_data(&mut self) {
            self.log("reset");
        }

        fn end_draw_pass(&mut self) {
            self.log("end");
        }
    }

    fn journal() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn take(journal: &Rc<RefCell<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *journal.borrow_mut())
    }

    fn count(device: &HeadlessDevice, pred: impl Fn(&DeviceCommand) -> bool) -> usize {
        device.commands().iter().filter(|c| pred(*c)).count()
    }

    /// Ready system with one `Recorder` registered for `Forward`.
    fn ready_system() -> (DrawingSystem, Rc<HeadlessDevice>, Rc<RefCell<Recorder>>) {
        let (devices, slot) = headless_catalog();
        let journal = journal();
        let mut renderers = RendererCatalog::new();
        let recorder = renderers.register(RendererType::Forward, Recorder::new("fwd", &journal));

        let mut system = DrawingSystem::new(DeviceType::D3D11);
        system
            .initialize(Some(&config(800, 600)), &devices, &renderers)
            .unwrap();
        let device = slot.borrow().clone().unwrap();
        journal.borrow_mut().clear();
        (system, device, recorder)
    }

    fn recorder_log(recorder: &Rc<RefCell<Recorder>>) -> Vec<String> {
        take(&recorder.borrow().journal)
    }

    #[test]
    fn tick_before_initialize_is_not_ready() {
        let mut system = DrawingSystem::new(DeviceType::D3D11);
        let scene = ComponentStore::new();
        assert!(matches!(
            system.tick(&scene, 0.016),
            Err(DrawingError::NotReady)
        ));
        assert_eq!(system.state(), SystemState::Uninitialized);
    }

    #[test]
    fn missing_configuration_fails_first_stage() {
        let (devices, slot) = headless_catalog();
        let mut system = DrawingSystem::new(DeviceType::D3D11);
        let err = system
            .initialize(None, &devices, &RendererCatalog::new())
            .unwrap_err();
        assert!(matches!(err, DrawingError::MissingConfiguration));
        assert_eq!(system.state(), SystemState::Failed);
        assert!(!system.is_ready());
        assert!(slot.borrow().is_none(), "no device may be created");
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let (devices, _slot) = headless_catalog();
        let mut system = DrawingSystem::new(DeviceType::D3D11);
        let err = system
            .initialize(Some(&config(0, 600)), &devices, &RendererCatalog::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DrawingError::Config(ConfigError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn unsupported_device_is_an_error_value() {
        let mut devices = DeviceCatalog::new();
        devices.register(DeviceType::D3D11, |ty| {
            Rc::new(HeadlessDevice::new(ty)) as Rc<dyn Device>
        });
        let mut system = DrawingSystem::new(DeviceType::D3D12);
        let err = system
            .initialize(Some(&config(800, 600)), &devices, &RendererCatalog::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DrawingError::UnsupportedDevice(DeviceType::D3D12)
        ));
        assert_eq!(system.state(), SystemState::Failed);
    }

    #[test]
    fn initialize_builds_everything() {
        let (devices, _slot) = headless_catalog();
        let journal = journal();
        let mut renderers = RendererCatalog::new();
        renderers.register(RendererType::Forward, Recorder::new("fwd", &journal));
        renderers.register(RendererType::Deferred, Recorder::new("def", &journal));

        let mut system = DrawingSystem::new(DeviceType::D3D11);
        system
            .initialize(Some(&config(1920, 1080)), &devices, &renderers)
            .unwrap();

        assert!(system.is_ready());
        assert!(system.table().unwrap().is_built());
        let context = system.context().unwrap();
        let swap = context.swap_chain().unwrap();
        assert_eq!((swap.desc().width, swap.desc().height), (1920, 1080));
        assert_eq!(swap.desc().format, SWAP_CHAIN_FORMAT);
        assert_eq!(swap.desc().sample_quality, 0);
        let depth = context.depth_buffer().unwrap();
        assert_eq!(depth.desc().format, DEPTH_FORMAT);
        assert_eq!(context.viewport(), Viewport::full(1920, 1080));
        assert_eq!(system.renderer_count(), 2);

        system.shutdown();
        assert_eq!(system.renderer_count(), 0);
        assert_eq!(system.state(), SystemState::Uninitialized);
        assert!(system.table().is_none());
    }

    #[test]
    fn renderer_setup_follows_type_order_and_stage_order() {
        let (devices, _slot) = headless_catalog();
        let journal = journal();
        let mut renderers = RendererCatalog::new();
        // Inserted out of order on purpose.
        renderers.register(RendererType::Deferred, Recorder::new("def", &journal));
        renderers.register(RendererType::Basic, Recorder::new("basic", &journal));

        let mut system = DrawingSystem::new(DeviceType::D3D11);
        system
            .initialize(Some(&config(64, 64)), &devices, &renderers)
            .unwrap();

        assert_eq!(
            take(&journal),
            vec![
                "basic:attach_device",
                "basic:define_resources",
                "basic:setup_stages",
                "def:attach_device",
                "def:define_resources",
                "def:setup_stages",
                "basic:create_data_resources",
                "def:create_data_resources",
                "basic:map_resources",
                "def:map_resources",
            ]
        );
    }

    #[test]
    fn msaa_sets_sample_count_and_quality() {
        let (devices, _slot) = headless_catalog();
        let mut config = config(640, 480);
        config.graphics.msaa = Msaa::X4;
        let mut system = DrawingSystem::from_config(&config);
        system
            .initialize(Some(&config), &devices, &RendererCatalog::new())
            .unwrap();
        let swap = system.context().unwrap().swap_chain().unwrap();
        assert_eq!(swap.desc().sample_count, 4);
        assert_eq!(swap.desc().sample_quality, 1);
    }

    #[test]
    fn failed_target_creation_aborts_post_configuration() {
        let mut devices = DeviceCatalog::new();
        devices.register(DeviceType::D3D11, |ty| {
            let device = HeadlessDevice::new(ty);
            device.fail_on(ResourceKind::DepthBuffer);
            Rc::new(device) as Rc<dyn Device>
        });
        let journal = journal();
        let mut renderers = RendererCatalog::new();
        renderers.register(RendererType::Forward, Recorder::new("fwd", &journal));

        let mut system = DrawingSystem::new(DeviceType::D3D11);
        let err = system
            .initialize(Some(&config(64, 64)), &devices, &renderers)
            .unwrap_err();
        assert!(matches!(
            err,
            DrawingError::Device(DeviceError::CreationFailed {
                kind: ResourceKind::DepthBuffer,
                ..
            })
        ));
        assert_eq!(system.state(), SystemState::Failed);
        assert!(system.table().is_none());
        assert!(!journal.borrow().iter().any(|c| c.ends_with("create_data_resources")));
        assert_eq!(journal.borrow().last().map(String::as_str), Some("fwd:detach"));
    }

    #[test]
    fn initialize_twice_is_rejected() {
        let (mut system, _device, _recorder) = ready_system();
        let (devices, _slot) = headless_catalog();
        assert!(matches!(
            system.initialize(Some(&config(64, 64)), &devices, &RendererCatalog::new()),
            Err(DrawingError::AlreadyInitialized)
        ));
        assert!(system.is_ready());
    }

    #[test]
    fn device_type_is_fixed_once_initialized() {
        let (mut system, _device, _recorder) = ready_system();
        system.set_device_type(DeviceType::D3D12);
        assert_eq!(system.device_type(), DeviceType::D3D11);

        system.shutdown();
        system.set_device_type(DeviceType::D3D12);
        assert_eq!(system.device_type(), DeviceType::D3D12);
    }

    #[test]
    fn flush_entity_classifies_without_dedup() {
        let mut scene = ComponentStore::new();
        let both = scene.spawn_camera(Vec3::ZERO, Camera::default());
        scene.insert(both, MeshFilter::new(Arc::new(Mesh::cube())));
        let bare = scene.spawn();
        scene.insert(bare, Camera::default());

        let mut system = DrawingSystem::new(DeviceType::D3D11);
        system.flush_entity(&scene, both);
        system.flush_entity(&scene, both);
        system.flush_entity(&scene, bare);
        assert_eq!(system.camera_count(), 2);
        assert_eq!(system.mesh_count(), 2);

        system.clear_entities();
        assert_eq!(system.camera_count(), 0);
    }

    #[test]
    fn one_camera_one_mesh_runs_protocol_once() {
        let (mut system, device, recorder) = ready_system();
        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(Vec3::new(0.0, 0.0, -5.0), Camera::default());
        let mesh = scene.spawn_mesh(Transform::default(), Arc::new(Mesh::cube()));
        system.flush_entity(&scene, camera);
        system.flush_entity(&scene, mesh);

        let stats = system.tick(&scene, 0.016).unwrap();
        assert_eq!(
            recorder_log(&recorder),
            vec!["fwd:begin", "fwd:attach", "fwd:flush", "fwd:draw", "fwd:reset", "fwd:end"]
        );
        assert_eq!(
            stats,
            FrameStats {
                cameras: 1,
                cameras_skipped: 0,
                draw_calls: 1,
                meshes_skipped: 0,
            }
        );
        assert_eq!(device.present_count(), 1);
    }

    #[test]
    fn frame_order_is_clear_then_present() {
        let (mut system, device, _recorder) = ready_system();
        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(Vec3::new(0.0, 1.0, -5.0), Camera::default());
        system.flush_entity(&scene, camera);
        device.take_commands();

        system.tick(&scene, 0.016).unwrap();
        let log = device.take_commands();
        assert_eq!(log.len(), 3);
        assert!(matches!(
            log[0],
            DeviceCommand::ClearTarget { color, .. } if color == Camera::default().background
        ));
        assert!(matches!(
            log[1],
            DeviceCommand::ClearDepthBuffer { depth, stencil: 0, flags, .. }
                if depth == 1.0 && flags == ClearFlags::DEPTH
        ));
        assert!(matches!(
            log[2],
            DeviceCommand::Present { sync_interval: 0, .. }
        ));
    }

    #[test]
    fn unregistered_renderer_still_clears() {
        let (mut system, device, recorder) = ready_system();
        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(Vec3::new(0.0, 0.0, -5.0), Camera::with_renderer(RendererType::Shadow));
        let mesh = scene.spawn_mesh(Transform::default(), Arc::new(Mesh::cube()));
        system.flush_entity(&scene, camera);
        system.flush_entity(&scene, mesh);
        device.take_commands();

        let stats = system.tick(&scene, 0.016).unwrap();
        assert_eq!(stats.cameras, 1);
        assert_eq!(stats.cameras_skipped, 1);
        assert_eq!(stats.draw_calls, 0);
        assert!(recorder_log(&recorder).is_empty());
        assert_eq!(count(&device, |c| matches!(c, DeviceCommand::ClearTarget { .. })), 1);
        assert_eq!(count(&device, |c| matches!(c, DeviceCommand::ClearDepthBuffer { .. })), 1);
        assert_eq!(device.present_count(), 1);
    }

    #[test]
    fn each_draw_sees_its_own_world_matrix() {
        let (mut system, _device, recorder) = ready_system();
        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(Vec3::new(0.0, 2.0, -8.0), Camera::default());
        system.flush_entity(&scene, camera);

        let transforms = [
            Transform::from_position(Vec3::new(-2.0, 0.0, 3.0)),
            Transform {
                position: Vec3::new(4.0, 1.0, 0.0),
                rotation: Vec3::new(0.0, 0.5, 0.0),
                scale: Vec3::splat(2.0),
            },
        ];
        for t in transforms {
            let mesh = scene.spawn_mesh(t, Arc::new(Mesh::cube()));
            system.flush_entity(&scene, mesh);
        }

        system.tick(&scene, 0.016).unwrap();
        let seen = recorder.borrow().worlds.clone();
        assert_eq!(seen, transforms.iter().map(world_matrix).collect::<Vec<_>>());
    }

    #[test]
    fn cameras_render_in_insertion_order() {
        let (mut system, _device, recorder) = ready_system();
        let mut scene = ComponentStore::new();
        let a = scene.spawn_camera(Vec3::new(0.0, 0.0, -5.0), Camera::default());
        let b = scene.spawn_camera(Vec3::new(3.0, 0.0, -5.0), Camera::default());
        let mesh = scene.spawn_mesh(Transform::default(), Arc::new(Mesh::cube()));
        for id in [b, a, mesh] {
            system.flush_entity(&scene, id);
        }

        let stats = system.tick(&scene, 0.016).unwrap();
        assert_eq!(stats.cameras, 2);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(recorder.borrow().worlds.len(), 2);

        let table = system.table().unwrap();
        let last = projection_matrix(60.0, 0.1, 1000.0, 800.0 / 600.0)
            * view_matrix(Vec3::new(0.0, 0.0, -5.0));
        assert!(table.matrix(VIEW_PROJECTION).unwrap().abs_diff_eq(last, 1e-5));
    }

    #[test]
    fn stale_entities_are_skipped() {
        let (mut system, _device, _recorder) = ready_system();
        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(Vec3::new(0.0, 0.0, -5.0), Camera::default());
        let gone = scene.spawn_camera(Vec3::ZERO, Camera::default());
        let mesh = scene.spawn_mesh(Transform::default(), Arc::new(Mesh::cube()));
        for id in [camera, gone, mesh] {
            system.flush_entity(&scene, id);
        }
        scene.despawn(gone);
        scene.remove::<MeshFilter>(mesh);

        let stats = system.tick(&scene, 0.016).unwrap();
        assert_eq!(stats.cameras, 1);
        assert_eq!(stats.cameras_skipped, 1);
        assert_eq!(stats.meshes_skipped, 1);
        assert_eq!(stats.draw_calls, 0);
    }

    #[test]
    fn failed_flush_still_closes_the_pass() {
        let (mut system, device, recorder) = ready_system();
        recorder.borrow_mut().fail_flush = true;
        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(Vec3::new(0.0, 0.0, -5.0), Camera::default());
        let mesh = scene.spawn_mesh(Transform::default(), Arc::new(Mesh::cube()));
        system.flush_entity(&scene, camera);
        system.flush_entity(&scene, mesh);

        let err = system.tick(&scene, 0.016).unwrap_err();
        assert!(matches!(err, DrawingError::Renderer(_)));
        assert_eq!(
            recorder_log(&recorder),
            vec!["fwd:begin", "fwd:attach", "fwd:flush", "fwd:reset", "fwd:end"]
        );
        assert_eq!(device.present_count(), 0);
    }

    #[test]
    fn frame_clock_advances_per_tick() {
        let (mut system, _device, _recorder) = ready_system();
        let scene = ComponentStore::new();
        system.tick(&scene, 0.5).unwrap();
        system.tick(&scene, 0.25).unwrap();
        let time = system.context().unwrap().time();
        assert_eq!(time.frame, 2);
        assert_eq!(time.total, 0.75);
    }

    #[test]
    fn shared_instance_is_set_up_once() {
        let (devices, _slot) = headless_catalog();
        let journal = journal();
        let mut renderers = RendererCatalog::new();
        let shared = renderers.register(RendererType::Forward, Recorder::new("fwd", &journal));
        renderers.insert(RendererType::Debug, shared);

        let mut system = DrawingSystem::new(DeviceType::D3D11);
        system
            .initialize(Some(&config(64, 64)), &devices, &renderers)
            .unwrap();
        assert_eq!(system.renderer_count(), 2);
        assert_eq!(
            take(&journal),
            vec![
                "fwd:attach_device",
                "fwd:define_resources",
                "fwd:setup_stages",
                "fwd:create_data_resources",
                "fwd:map_resources",
            ]
        );

        system.shutdown();
        assert_eq!(take(&journal), vec!["fwd:detach"]);
    }

    #[test]
    fn renders_again_after_shutdown_and_reinitialize() {
        let (devices, slot) = headless_catalog();
        let mut renderers = RendererCatalog::new();
        let debug = renderers.register(RendererType::Forward, DebugRenderer::new());
        renderers.insert(RendererType::Debug, debug.clone());

        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(Vec3::new(0.0, 0.0, -4.0), Camera::default());
        let mesh = scene.spawn_mesh(Transform::default(), Arc::new(Mesh::cube()));

        let mut system = DrawingSystem::new(DeviceType::D3D11);
        system
            .initialize(Some(&config(320, 200)), &devices, &renderers)
            .unwrap();
        system.flush_entity(&scene, camera);
        system.flush_entity(&scene, mesh);
        system.tick(&scene, 0.016).unwrap();

        let first = slot.borrow_mut().take().unwrap();
        system.shutdown();
        assert_eq!(Rc::strong_count(&first), 1, "shutdown releases the device");
        assert_eq!(debug.borrow().vertex_capacity(), None);

        system
            .initialize(Some(&config(320, 200)), &devices, &renderers)
            .unwrap();
        let stats = system.tick(&scene, 0.016).unwrap();
        assert_eq!(stats.draw_calls, 1);

        let second = slot.borrow().clone().unwrap();
        assert_eq!(second.draw_count(), 1);
        assert_eq!(
            count(&second, |c| matches!(c, DeviceCommand::CreateBuffer { size: 1024, .. })),
            1
        );
        assert_eq!(debug.borrow().draw_count(), 2);
    }

    #[test]
    fn debug_renderer_draws_through_the_system() {
        let (devices, slot) = headless_catalog();
        let mut renderers = RendererCatalog::new();
        let debug = renderers.register(RendererType::Forward, DebugRenderer::new());
        renderers.insert(RendererType::Debug, debug.clone());

        let mut system = DrawingSystem::new(DeviceType::D3D12);
        system
            .initialize(Some(&config(320, 200)), &devices, &renderers)
            .unwrap();
        assert_eq!(system.renderer_count(), 2);
        assert!(system.effect_pool().unwrap().contains(crate::debug::DEBUG_EFFECT));

        let mut scene = ComponentStore::new();
        let camera = scene.spawn_camera(
            Vec3::new(0.0, 0.0, -4.0),
            Camera::with_renderer(RendererType::Debug),
        );
        let mesh = scene.spawn_mesh(
            Transform::from_position(Vec3::new(1.0, 0.0, 0.0)),
            Arc::new(Mesh::cube()),
        );
        system.flush_entity(&scene, camera);
        system.flush_entity(&scene, mesh);
        system.tick(&scene, 0.016).unwrap();

        let device = slot.borrow().clone().unwrap();
        assert_eq!(device.draw_count(), 1);
        assert!(debug.borrow().report().contains("world=(1.00, 0.00, 0.00)"));
    }
}
