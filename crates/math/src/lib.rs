//! Matrix math: minimal column-major 4x4 algebra for model, view and projection.
//!
//! # Invariants
//! - Every builder writes a fully populated matrix into a caller-provided output.
//! - No builder allocates; per-frame work only touches stack temporaries.
//! - In-place variants produce exactly what the out-of-place form would.

mod matrix;
pub mod mat4;

pub use glam::Vec3 as Vector3;
pub use matrix::Matrix4;

/// Precondition violations reported by the matrix builders.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum MathError {
    #[error("near and far planes coincide at {0}")]
    DegenerateDepthRange(f32),
}
