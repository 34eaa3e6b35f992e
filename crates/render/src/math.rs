//! Camera and object matrices.
//!
//! Matrices are laid out as literal row-major tables in the row-vector
//! convention (`v' = v * M`) and loaded with [`Mat4::from_cols_array`], which
//! yields the equivalent glam column-vector matrix. Compose them glam-style:
//! `projection * view * world`.

use glam::{Mat4, Vec3};
use prism_common::Transform;

/// Point every camera looks at. Camera rigs are fixed-forward: only the eye
/// position comes from the camera's transform.
pub const FIXED_TARGET: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// Camera up direction.
pub const UP: Vec3 = Vec3::Y;

/// Object-to-world matrix: scale, then yaw about Y, then translate.
///
/// Only `rotation.y` is honoured.
pub fn world_matrix(transform: &Transform) -> Mat4 {
    let p = transform.position;
    let s = transform.scale;
    let (sin, cos) = transform.rotation.y.sin_cos();

    #[rustfmt::skip]
    let translate = Mat4::from_cols_array(&[
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        p.x, p.y, p.z, 1.0,
    ]);
    #[rustfmt::skip]
    let rotate = Mat4::from_cols_array(&[
        cos, 0.0, sin, 0.0,
        0.0, 1.0, 0.0, 0.0,
        -sin, 0.0, cos, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]);
    #[rustfmt::skip]
    let scale = Mat4::from_cols_array(&[
        s.x, 0.0, 0.0, 0.0,
        0.0, s.y, 0.0, 0.0,
        0.0, 0.0, s.z, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]);

    translate * rotate * scale
}

/// Left-handed look-at from `eye` towards [`FIXED_TARGET`].
///
/// An eye placed exactly on the target has no viewing direction and produces
/// NaN entries.
pub fn view_matrix(eye: Vec3) -> Mat4 {
    let z = (FIXED_TARGET - eye).normalize();
    let x = UP.cross(z).normalize();
    let y = z.cross(x);

    #[rustfmt::skip]
    let view = Mat4::from_cols_array(&[
        x.x, y.x, z.x, 0.0,
        x.y, y.y, z.y, 0.0,
        x.z, y.z, z.z, 0.0,
        -x.dot(eye), -y.dot(eye), -z.dot(eye), 1.0,
    ]);
    view
}

/// Left-handed perspective projection with depth mapped to `[0, 1]`.
///
/// `fov_degrees` is the vertical field of view; `aspect` is width over height.
pub fn projection_matrix(fov_degrees: f32, near: f32, far: f32, aspect: f32) -> Mat4 {
    let y_scale = 1.0 / (fov_degrees.to_radians() / 2.0).tan();
    let x_scale = y_scale / aspect;
    let depth = far / (far - near);

    #[rustfmt::skip]
    let projection = Mat4::from_cols_array(&[
        x_scale, 0.0, 0.0, 0.0,
        0.0, y_scale, 0.0, 0.0,
        0.0, 0.0, depth, 1.0,
        0.0, 0.0, -near * depth, 0.0,
    ]);
    projection
}
