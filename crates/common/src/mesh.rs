use glam::Vec3;
use serde::{Deserialize, Serialize};

/// CPU-side mesh asset: positions, normals and a triangle index list.
///
/// Renderers receive meshes by shared reference during the draw pass and
/// upload whatever they need themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            positions: Vec::new(),
            normals: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Unit cube centered on the origin, 24 vertices and 36 indices.
    pub fn cube() -> Self {
        let p = 0.5_f32;
        let faces: [(Vec3, [[f32; 3]; 4]); 6] = [
            (Vec3::Z, [[-p, -p, p], [p, -p, p], [p, p, p], [-p, p, p]]),
            (Vec3::NEG_Z, [[p, -p, -p], [-p, -p, -p], [-p, p, -p], [p, p, -p]]),
            (Vec3::X, [[p, -p, p], [p, -p, -p], [p, p, -p], [p, p, p]]),
            (Vec3::NEG_X, [[-p, -p, -p], [-p, -p, p], [-p, p, p], [-p, p, -p]]),
            (Vec3::Y, [[-p, p, p], [p, p, p], [p, p, -p], [-p, p, -p]]),
            (Vec3::NEG_Y, [[-p, -p, -p], [p, -p, -p], [p, -p, p], [-p, -p, p]]),
        ];

        let mut mesh = Self::new("unit_cube");
        for (normal, corners) in faces {
            let base = mesh.vertex_count();
            for corner in corners {
                mesh.positions.push(Vec3::from_array(corner));
                mesh.normals.push(normal);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        mesh
    }
}
