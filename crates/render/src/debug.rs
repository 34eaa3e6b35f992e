//! Debug renderer: draws every mesh with one flat effect and keeps a
//! human-readable line per draw.
//!
//! Useful for CLI output, logging, and testing the draw-pass protocol on the
//! headless backend.

use crate::context::{DrawingContext, VIEW_PROJECTION, WORLD};
use crate::device::Device;
use crate::renderer::Renderer;
use crate::resource::*;
use crate::system::DrawingError;
use crate::table::{ResourceDesc, ResourceTable, TableError};
use glam::Mat4;
use prism_common::Mesh;
use std::fmt::Write;
use std::rc::Rc;
use std::sync::Arc;

pub const DEBUG_EFFECT: &str = "DebugEffect";
pub const DEBUG_PIPELINE: &str = "DebugPipeline";
pub const DEBUG_TRANSFORMS: &str = "DebugTransformBuffer";

const DEBUG_EFFECT_SOURCE: &str = r#"
cbuffer Transforms : register(b0) { float4x4 gWorld; float4x4 gViewProjection; };
float4 vs_main(float3 pos : POSITION) : SV_POSITION {
    return mul(mul(float4(pos, 1.0), gWorld), gViewProjection);
}
float4 ps_main() : SV_TARGET { return float4(1.0, 0.0, 1.0, 1.0); }
"#;

/// World and view-projection matrices, uploaded together.
const TRANSFORM_BYTES: u64 = 2 * std::mem::size_of::<Mat4>() as u64;
const INITIAL_VERTEX_BYTES: u64 = 1024;

#[derive(Debug, Default)]
pub struct DebugRenderer {
    device: Option<Rc<dyn Device>>,
    context: Option<Rc<DrawingContext>>,
    pipeline: Option<Rc<PipelineState>>,
    transforms: Option<Rc<Buffer>>,
    vertices: Option<Rc<Buffer>>,
    mesh: Option<Arc<Mesh>>,
    in_pass: bool,
    draws: usize,
    report: String,
}

impl DebugRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// One line per draw since the last [`take_report`](Self::take_report).
    pub fn report(&self) -> &str {
        &self.report
    }

    pub fn take_report(&mut self) -> String {
        std::mem::take(&mut self.report)
    }

    pub fn draw_count(&self) -> usize {
        self.draws
    }

    /// Byte capacity of the scratch vertex buffer, once created.
    pub fn vertex_capacity(&self) -> Option<u64> {
        self.vertices.as_ref().map(|b| b.desc().size)
    }

    fn device(&self) -> Result<&Rc<dyn Device>, DrawingError> {
        self.device
            .as_ref()
            .ok_or_else(|| DrawingError::Renderer("debug renderer has no device".into()))
    }

    fn release(&mut self) {
        self.pipeline = None;
        self.transforms = None;
        self.vertices = None;
        self.mesh = None;
        self.in_pass = false;
    }

    fn create_vertex_buffer(&self, size: u64) -> Result<Rc<Buffer>, DrawingError> {
        Ok(self.device()?.create_buffer(&BufferDesc {
            size,
            usage: BufferUsage::Vertex,
        })?)
    }
}

impl Renderer for DebugRenderer {
    fn attach_device(&mut self, device: Rc<dyn Device>, context: Rc<DrawingContext>) {
        self.release();
        self.device = Some(device);
        self.context = Some(context);
    }

    fn detach(&mut self) {
        self.release();
        self.device = None;
        self.context = None;
    }

    fn define_resources(&mut self, table: &mut ResourceTable) -> Result<(), TableError> {
        table.define(
            DEBUG_EFFECT,
            ResourceDesc::Effect(EffectDesc::new(DEBUG_EFFECT, DEBUG_EFFECT_SOURCE)),
        )?;
        table.define(
            DEBUG_PIPELINE,
            ResourceDesc::PipelineState(PipelineStateDesc {
                effect: DEBUG_EFFECT.into(),
                topology: PrimitiveTopology::TriangleList,
                depth_test: true,
                depth_write: true,
            }),
        )?;
        table.define(
            DEBUG_TRANSFORMS,
            ResourceDesc::Buffer(BufferDesc {
                size: TRANSFORM_BYTES,
                usage: BufferUsage::Constant,
            }),
        )
    }

    fn setup_stages(&mut self) {
        tracing::debug!(pipeline = DEBUG_PIPELINE, "debug renderer stages ready");
    }

    fn create_data_resources(&mut self, _table: &ResourceTable) -> Result<(), DrawingError> {
        self.vertices = Some(self.create_vertex_buffer(INITIAL_VERTEX_BYTES)?);
        Ok(())
    }

    fn map_resources(&mut self, table: &ResourceTable) -> Result<(), DrawingError> {
        self.pipeline = Some(table.pipeline_state(DEBUG_PIPELINE)?);
        self.transforms = Some(table.buffer(DEBUG_TRANSFORMS)?);
        Ok(())
    }

    fn begin_draw_pass(&mut self) {
        if self.in_pass {
            tracing::warn!("debug renderer pass begun twice");
        }
        self.in_pass = true;
    }

    fn attach_mesh(&mut self, mesh: &Arc<Mesh>) {
        self.mesh = Some(Arc::clone(mesh));
    }

    fn flush_data(&mut self) -> Result<(), DrawingError> {
        let Some(mesh) = self.mesh.clone() else {
            return Ok(());
        };
        let bytes: &[u8] = bytemuck::cast_slice(&mesh.positions);
        if bytes.is_empty() {
            return Ok(());
        }

        let needed = bytes.len() as u64;
        let capacity = self.vertex_capacity().unwrap_or(0);
        if needed > capacity {
            let grown = needed.next_power_of_two().max(INITIAL_VERTEX_BYTES);
            tracing::debug!(from = capacity, to = grown, "growing debug vertex buffer");
            self.vertices = Some(self.create_vertex_buffer(grown)?);
        }

        let device = self.device()?;
        if let Some(vertices) = &self.vertices {
            device.update_buffer(vertices, 0, bytes)?;
        }
        Ok(())
    }

    fn draw(&mut self, table: &ResourceTable) -> Result<(), DrawingError> {
        let mesh = self
            .mesh
            .clone()
            .ok_or_else(|| DrawingError::Renderer("draw without an attached mesh".into()))?;
        let (Some(pipeline), Some(transforms)) = (&self.pipeline, &self.transforms) else {
            return Err(DrawingError::Renderer(
                "debug renderer resources are not mapped".into(),
            ));
        };

        let world = table.matrix(WORLD)?;
        let view_projection = table.matrix(VIEW_PROJECTION)?;
        let device = self.device()?;
        device.update_buffer(transforms, 0, bytemuck::cast_slice(&[world, view_projection]))?;
        device.draw_indexed(pipeline, mesh.index_count(), 0);
        self.draws += 1;

        let frame = self.context.as_ref().map_or(0, |c| c.time().frame);
        let t = world.w_axis;
        let _ = writeln!(
            self.report,
            "[frame {frame}] {}: vertices={} indices={} world=({:.2}, {:.2}, {:.2})",
            mesh.name,
            mesh.vertex_count(),
            mesh.index_count(),
            t.x,
            t.y,
            t.z
        );
        Ok(())
    }

    fn reset_data(&mut self) {
        self.mesh = None;
    }

    fn end_draw_pass(&mut self) {
        self.in_pass = false;
    }
}
