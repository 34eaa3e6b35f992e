use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an entity in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Spatial transform: position, Euler rotation in radians, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in radians, one per axis.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Linear RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);
    pub const SLATE: Self = Self::rgba(0.1, 0.1, 0.15, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Rendering technique selected by a camera.
///
/// Discriminants are contiguous from [`RendererType::START`] up to (but not
/// including) [`RendererType::END`]; registration walks that range in order.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RendererType {
    Basic = 0,
    Forward = 1,
    Deferred = 2,
    Shadow = 3,
    Debug = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown renderer type: {0}")]
pub struct UnknownRendererType(pub u32);

impl RendererType {
    pub const START: u32 = 0;
    pub const END: u32 = 5;

    /// Every renderer type in discriminant order.
    pub fn all() -> impl Iterator<Item = Self> {
        (Self::START..Self::END).filter_map(|raw| Self::try_from(raw).ok())
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for RendererType {
    type Error = UnknownRendererType;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Basic),
            1 => Ok(Self::Forward),
            2 => Ok(Self::Deferred),
            3 => Ok(Self::Shadow),
            4 => Ok(Self::Debug),
            other => Err(UnknownRendererType(other)),
        }
    }
}

impl std::fmt::Display for RendererType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Basic => "basic",
            Self::Forward => "forward",
            Self::Deferred => "deferred",
            Self::Shadow => "shadow",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Vec3::ZERO);
        assert_eq!(t.scale, Vec3::ONE);
    }

    #[test]
    fn renderer_types_are_contiguous() {
        let all: Vec<RendererType> = RendererType::all().collect();
        assert_eq!(all.len(), (RendererType::END - RendererType::START) as usize);
        for (i, ty) in all.iter().enumerate() {
            assert_eq!(ty.as_u32(), RendererType::START + i as u32);
        }
    }

    #[test]
    fn renderer_type_out_of_range() {
        assert_eq!(RendererType::try_from(1), Ok(RendererType::Forward));
        assert_eq!(
            RendererType::try_from(RendererType::END),
            Err(UnknownRendererType(RendererType::END))
        );
    }

    #[test]
    fn color_array_order() {
        let c = Color::rgba(0.1, 0.2, 0.3, 0.4);
        assert_eq!(c.to_array(), [0.1, 0.2, 0.3, 0.4]);
    }
}
