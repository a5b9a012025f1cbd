//! wgpu backend for the cube pipeline.
//!
//! Implements the immediate-mode command contract on top of wgpu: bindings
//! accumulate between calls and `draw_indexed` encodes and submits one pass.
//!
//! # Invariants
//! - One context per surface; a second bind fails.
//! - Programs link against a fixed interface table (no shader reflection).
//! - GL clip depth is remapped in the vertex stage, so projection matrices are
//!   uploaded unchanged.

mod context;
mod surface;

pub use context::{WgpuBuffer, WgpuContext, WgpuProgram, WgpuShader};
pub use surface::{OffscreenSurface, WindowSurface};
