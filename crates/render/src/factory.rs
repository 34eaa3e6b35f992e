use crate::device::{Device, DeviceError};
use crate::effect::EffectPool;
use crate::resource::ResourceKind;
use crate::table::{Resource, ResourceDesc};
use std::rc::Rc;

/// Turns resource descriptors into backend objects.
///
/// Effects go through the shared [`EffectPool`]; pipeline states resolve their
/// effect from the same pool, so an effect must be created before any pipeline
/// that names it.
#[derive(Debug)]
pub struct ResourceFactory {
    device: Rc<dyn Device>,
    effects: Rc<EffectPool>,
}

impl ResourceFactory {
    pub fn new(device: Rc<dyn Device>, effects: Rc<EffectPool>) -> Self {
        Self { device, effects }
    }

    pub fn device(&self) -> &Rc<dyn Device> {
        &self.device
    }

    pub fn effect_pool(&self) -> &Rc<EffectPool> {
        &self.effects
    }

    /// Create the backend object described by `desc`.
    ///
    /// Constants and externally bound targets are not device-created and are
    /// rejected as invalid descriptors.
    pub fn create(&self, desc: &ResourceDesc) -> Result<Resource, DeviceError> {
        match desc {
            ResourceDesc::Buffer(buffer) => Ok(Resource::Buffer(self.device.create_buffer(buffer)?)),
            ResourceDesc::Texture(texture) => {
                Ok(Resource::Texture(self.device.create_texture(texture)?))
            }
            ResourceDesc::Effect(effect) => {
                Ok(Resource::Effect(self.effects.get_or_compile(effect)?))
            }
            ResourceDesc::PipelineState(pipeline) => {
                let effect = self.effects.get(&pipeline.effect).ok_or_else(|| {
                    DeviceError::CreationFailed {
                        kind: ResourceKind::PipelineState,
                        reason: format!("effect `{}` has not been compiled", pipeline.effect),
                    }
                })?;
                Ok(Resource::PipelineState(
                    self.device.create_pipeline_state(pipeline, &effect)?,
                ))
            }
            ResourceDesc::Constant(_) | ResourceDesc::External(_) => {
                Err(DeviceError::InvalidDescriptor {
                    kind: desc.kind(),
                    reason: "not a device-created resource".into(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use crate::headless::HeadlessDevice;
    use crate::resource::*;
    use crate::table::ConstantKind;

    fn factory() -> ResourceFactory {
        let device: Rc<dyn Device> = Rc::new(HeadlessDevice::new(DeviceType::D3D12));
        device.initialize().unwrap();
        let pool = Rc::new(EffectPool::new(device.clone()));
        ResourceFactory::new(device, pool)
    }

    fn pipeline(effect: &str) -> ResourceDesc {
        ResourceDesc::PipelineState(PipelineStateDesc {
            effect: effect.into(),
            topology: PrimitiveTopology::TriangleList,
            depth_test: true,
            depth_write: true,
        })
    }

    #[test]
    fn creates_buffers_and_textures() {
        let factory = factory();
        let buffer = factory
            .create(&ResourceDesc::Buffer(BufferDesc {
                size: 64,
                usage: BufferUsage::Constant,
            }))
            .unwrap();
        assert_eq!(buffer.kind(), ResourceKind::Buffer);

        let texture = factory
            .create(&ResourceDesc::Texture(TextureDesc {
                width: 4,
                height: 4,
                format: PixelFormat::R8G8B8A8Unorm,
                mip_levels: 1,
            }))
            .unwrap();
        assert_eq!(texture.kind(), ResourceKind::Texture);
    }

    #[test]
    fn pipeline_needs_compiled_effect() {
        let factory = factory();
        assert!(matches!(
            factory.create(&pipeline("lit")),
            Err(DeviceError::CreationFailed {
                kind: ResourceKind::PipelineState,
                ..
            })
        ));

        factory
            .create(&ResourceDesc::Effect(EffectDesc::new(
                "lit",
                "vs_main ps_main",
            )))
            .unwrap();
        assert!(factory.effect_pool().contains("lit"));
        let created = factory.create(&pipeline("lit")).unwrap();
        assert_eq!(created.kind(), ResourceKind::PipelineState);
    }

    #[test]
    fn constants_are_not_device_resources() {
        let factory = factory();
        assert!(matches!(
            factory.create(&ResourceDesc::Constant(ConstantKind::Mat4)),
            Err(DeviceError::InvalidDescriptor {
                kind: ResourceKind::Constant,
                ..
            })
        ));
    }
}
