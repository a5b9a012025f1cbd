//! Graphics Pipeline Process: owns the GPU context and draws the cube.
//!
//! # Invariants
//! - GPU resources and geometry upload happen once per init cycle.
//! - Projection and view are fixed at init; only model and mvp change per frame.
//! - `mvp = projection * (view * model)`, in that order.
//! - Any setup failure is terminal until the next init.
//! - Frames are drawn one at a time; a draw completes before the next request.

pub mod gpu;
mod pipeline;
pub mod recording;
pub mod shaders;
mod surface;
mod worker;

pub use gpu::{GpuContext, GpuError};
pub use pipeline::{
    ErrorClass, FrameMatrices, FrameReport, Pipeline, PipelineConfig, PipelineError,
    PipelineState, RenderError,
};
pub use recording::{CommandLog, FailurePlan, GpuCommand, RecordingSurface};
pub use surface::{Surface, SurfaceHandle, SurfaceSize};
pub use worker::{RenderRequest, RenderResponse, RenderWorker, spawn};
