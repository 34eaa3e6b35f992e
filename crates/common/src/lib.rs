//! Shared value types for the prism rendering core.
//!
//! Everything here is plain data: no GPU handles, no interior mutability.
//! The renderer and the component store both depend on this crate.

mod mesh;
mod types;

pub use mesh::Mesh;
pub use types::{Color, EntityId, RendererType, Transform, UnknownRendererType};

pub fn crate_info() -> &'static str {
    "prism-common v0.1.0"
}
