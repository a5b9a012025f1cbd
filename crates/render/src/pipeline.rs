use glam::Vec3;
use serde::{Deserialize, Serialize};
use splitcube_geometry::CUBE;
use splitcube_math::{MathError, Matrix4, mat4};
use splitcube_protocol::{InputError, SceneData};

use crate::gpu::{
    AttributeLocation, BufferTarget, BufferUsage, ClearState, GpuContext, IndexFormat,
    ShaderStage, Topology, UniformLocation, VertexLayout,
};
use crate::shaders::{
    COLOR_ATTRIBUTE, CUBE_INTERFACE, FRAGMENT_SHADER, MATRIX_UNIFORM, POSITION_ATTRIBUTE,
    VERTEX_SHADER,
};
use crate::surface::{Surface, SurfaceHandle};

/// Fixed camera and clear settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub clear_color: [f32; 4],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            eye: Vec3::new(0.0, 1.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Broad category of a setup failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Resource,
    Compile,
    Link,
}

/// Unrecoverable setup failure. The pipeline stays in `Failed` until the
/// next init.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("no display surface was provided")]
    SurfaceMissing,
    #[error("rendering context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("{stage} shader failed to compile: {diagnostic}")]
    ShaderCompile {
        stage: ShaderStage,
        diagnostic: String,
    },
    #[error("program failed to link: {0}")]
    Link(String),
    #[error("shader binding `{0}` did not resolve")]
    MissingBinding(&'static str),
    #[error("failed to allocate {buffer} buffer: {reason}")]
    BufferAllocation {
        buffer: &'static str,
        reason: String,
    },
    #[error("invalid camera: {0}")]
    Camera(#[from] MathError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ShaderCompile { .. } => ErrorClass::Compile,
            Self::Link(_) => ErrorClass::Link,
            _ => ErrorClass::Resource,
        }
    }
}

/// Reasons a single frame did not draw. Neither changes pipeline state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("frame submission failed: {0}")]
    Frame(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Rendering,
    Failed(PipelineError),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Rendering => "rendering",
            Self::Failed(_) => "failed",
        }
    }
}

/// Projection and view are fixed at init; model and mvp change per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameMatrices {
    pub projection: Matrix4,
    pub view: Matrix4,
    pub model: Matrix4,
    pub mvp: Matrix4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Frames drawn since the last init, including this one.
    pub frame_index: u64,
    pub index_count: u32,
    pub mvp: Matrix4,
}

struct GpuResources<C: GpuContext> {
    context: C,
    program: C::Program,
    position: AttributeLocation,
    color: AttributeLocation,
    matrix: UniformLocation,
    positions: C::Buffer,
    colors: C::Buffer,
    indices: C::Buffer,
}

/// The graphics pipeline: owns the surface, the context and every GPU
/// resource created on it.
pub struct Pipeline<S: Surface> {
    config: PipelineConfig,
    state: PipelineState,
    surface: Option<SurfaceHandle<S>>,
    resources: Option<GpuResources<S::Context>>,
    matrices: FrameMatrices,
    frames: u64,
}

impl<S: Surface> Pipeline<S> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Uninitialized,
            surface: None,
            resources: None,
            matrices: FrameMatrices::default(),
            frames: 0,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn matrices(&self) -> &FrameMatrices {
        &self.matrices
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether the surface is held through a shared handle.
    pub fn is_degraded(&self) -> bool {
        self.surface.as_ref().is_some_and(SurfaceHandle::is_shared)
    }

    /// Run a full init cycle. Anything from a previous cycle is released first.
    ///
    /// `on_status` receives progress lines meant for the coordinator.
    pub fn init(
        &mut self,
        surface: Option<SurfaceHandle<S>>,
        mut on_status: impl FnMut(&str),
    ) -> Result<(), PipelineError> {
        self.resources = None;
        self.surface = None;
        self.frames = 0;
        self.state = PipelineState::Uninitialized;

        let result = self.build(surface, &mut on_status);
        match &result {
            Ok(()) => {
                self.state = PipelineState::Ready;
                tracing::info!(degraded = self.is_degraded(), "pipeline ready");
                on_status("Cube assets and matrices initialized.");
            }
            Err(e) => {
                tracing::error!(error = %e, "pipeline init failed");
                self.state = PipelineState::Failed(e.clone());
            }
        }
        result
    }

    fn build(
        &mut self,
        surface: Option<SurfaceHandle<S>>,
        on_status: &mut impl FnMut(&str),
    ) -> Result<(), PipelineError> {
        let mut surface = surface.ok_or(PipelineError::SurfaceMissing)?;
        let mut context = surface
            .create_context()
            .map_err(|e| PipelineError::ContextUnavailable(e.to_string()))?;
        context.set_clear_state(&ClearState {
            color: self.config.clear_color,
            ..ClearState::default()
        });
        on_status("Rendering context created.");

        let vertex = context
            .compile_shader(ShaderStage::Vertex, VERTEX_SHADER)
            .map_err(|diagnostic| PipelineError::ShaderCompile {
                stage: ShaderStage::Vertex,
                diagnostic,
            })?;
        let fragment = context
            .compile_shader(ShaderStage::Fragment, FRAGMENT_SHADER)
            .map_err(|diagnostic| PipelineError::ShaderCompile {
                stage: ShaderStage::Fragment,
                diagnostic,
            })?;
        let program = context
            .link_program(vertex, fragment, &CUBE_INTERFACE)
            .map_err(PipelineError::Link)?;

        let position = context
            .attribute_location(&program, POSITION_ATTRIBUTE)
            .ok_or(PipelineError::MissingBinding(POSITION_ATTRIBUTE))?;
        let color = context
            .attribute_location(&program, COLOR_ATTRIBUTE)
            .ok_or(PipelineError::MissingBinding(COLOR_ATTRIBUTE))?;
        let matrix = context
            .uniform_location(&program, MATRIX_UNIFORM)
            .ok_or(PipelineError::MissingBinding(MATRIX_UNIFORM))?;

        let mut upload = |buffer: &'static str, target, data: &[u8]| {
            context
                .create_buffer(target, data, BufferUsage::Static)
                .map_err(|reason| PipelineError::BufferAllocation { buffer, reason })
        };
        let positions = upload("position", BufferTarget::Array, CUBE.position_bytes())?;
        let colors = upload("color", BufferTarget::Array, CUBE.color_bytes())?;
        let indices = upload("index", BufferTarget::ElementArray, CUBE.index_bytes())?;

        let size = surface.size();
        let mut matrices = FrameMatrices::default();
        mat4::perspective(
            &mut matrices.projection,
            self.config.fov_y_degrees.to_radians(),
            size.aspect(),
            self.config.near,
            self.config.far,
        )?;
        mat4::look_at(
            &mut matrices.view,
            self.config.eye,
            self.config.target,
            self.config.up,
        );
        tracing::debug!(
            width = size.width,
            height = size.height,
            "camera matrices cached"
        );

        self.matrices = matrices;
        self.surface = Some(surface);
        self.resources = Some(GpuResources {
            context,
            program,
            position,
            color,
            matrix,
            positions,
            colors,
            indices,
        });
        Ok(())
    }

    /// Draw one frame at the scene's rotation.
    ///
    /// Rejected input leaves the cached matrices and state untouched.
    pub fn render(&mut self, scene: &SceneData) -> Result<FrameReport, RenderError> {
        if !matches!(self.state, PipelineState::Ready | PipelineState::Rendering) {
            return Err(InputError::NotReady {
                state: self.state.name(),
            }
            .into());
        }
        scene.validate()?;
        let (Some(res), Some(surface)) = (self.resources.as_mut(), self.surface.as_ref()) else {
            return Err(InputError::NotReady {
                state: self.state.name(),
            }
            .into());
        };

        let m = &mut self.matrices;
        mat4::identity(&mut m.model);
        mat4::rotate_y_in_place(&mut m.model, scene.cube_rotation_y as f32);
        mat4::multiply(&mut m.mvp, &m.view, &m.model);
        mat4::premultiply(&mut m.mvp, &m.projection);

        let ctx = &mut res.context;
        ctx.clear();
        ctx.set_viewport(surface.size());
        ctx.use_program(&res.program);
        ctx.bind_vertex_attribute(res.position, &res.positions, VertexLayout::VEC3);
        ctx.bind_vertex_attribute(res.color, &res.colors, VertexLayout::VEC3);
        ctx.set_uniform_matrix(res.matrix, &m.mvp);
        ctx.bind_index_buffer(&res.indices, IndexFormat::Uint16);
        ctx.draw_indexed(Topology::TriangleList, CUBE.index_count())
            .map_err(RenderError::Frame)?;

        self.state = PipelineState::Rendering;
        self.frames += 1;
        tracing::trace!(
            frame = self.frames,
            angle = scene.cube_rotation_y,
            "frame drawn"
        );
        Ok(FrameReport {
            frame_index: self.frames,
            index_count: CUBE.index_count(),
            mvp: m.mvp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{CommandLog, FailurePlan, GpuCommand, RecordingSurface};
    use crate::surface::SurfaceSize;
    use std::sync::{Arc, Mutex};

    const SIZE: SurfaceSize = SurfaceSize::new(800, 600);

    fn new_pipeline() -> Pipeline<RecordingSurface> {
        Pipeline::new(PipelineConfig::default())
    }

    fn owned(surface: RecordingSurface) -> Option<SurfaceHandle<RecordingSurface>> {
        Some(SurfaceHandle::Owned(surface))
    }

    fn ready_pipeline() -> (Pipeline<RecordingSurface>, CommandLog) {
        let surface = RecordingSurface::new(SIZE);
        let log = surface.log();
        let mut pipeline = new_pipeline();
        pipeline.init(owned(surface), |_| {}).unwrap();
        (pipeline, log)
    }

    fn failing(plan: FailurePlan) -> PipelineError {
        let mut pipeline = new_pipeline();
        let surface = RecordingSurface::with_plan(SIZE, plan);
        let err = pipeline.init(owned(surface), |_| {}).unwrap_err();
        assert_eq!(pipeline.state(), &PipelineState::Failed(err.clone()));
        err
    }

    fn attribute_binding(command: &GpuCommand) -> Option<(AttributeLocation, VertexLayout)> {
        match command {
            GpuCommand::BindAttribute {
                location,
                layout,
                ..
            } => Some((*location, *layout)),
            _ => None,
        }
    }

    #[test]
    fn init_without_surface_fails_before_any_gpu_work() {
        let mut pipeline = new_pipeline();
        let mut statuses = Vec::new();
        let err = pipeline
            .init(None, |s| statuses.push(s.to_owned()))
            .unwrap_err();
        assert_eq!(err, PipelineError::SurfaceMissing);
        assert_eq!(err.class(), ErrorClass::Resource);
        assert_eq!(
            pipeline.state(),
            &PipelineState::Failed(PipelineError::SurfaceMissing)
        );
        assert!(statuses.is_empty());
    }

    #[test]
    fn successful_init_uploads_once_and_caches_camera() {
        let (pipeline, log) = ready_pipeline();
        assert_eq!(pipeline.state(), &PipelineState::Ready);

        let buffers: Vec<_> = log
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                GpuCommand::CreateBuffer {
                    target,
                    len,
                    usage,
                    ..
                } => Some((target, len, usage)),
                _ => None,
            })
            .collect();
        assert_eq!(
            buffers,
            vec![
                (BufferTarget::Array, 96, BufferUsage::Static),
                (BufferTarget::Array, 96, BufferUsage::Static),
                (BufferTarget::ElementArray, 72, BufferUsage::Static),
            ]
        );

        let expected_proj =
            glam::Mat4::perspective_rh_gl(45f32.to_radians(), 800.0 / 600.0, 0.1, 100.0);
        let matrices = pipeline.matrices();
        assert!(matrices.projection.approx_eq(&expected_proj.into(), 1e-5));
        let expected_view = glam::Mat4::look_at_rh(Vec3::new(0.0, 1.0, 3.0), Vec3::ZERO, Vec3::Y);
        assert!(matrices.view.approx_eq(&expected_view.into(), 1e-5));
    }

    #[test]
    fn init_sets_black_clear_and_depth_test() {
        let (_, log) = ready_pipeline();
        let black = ClearState {
            color: [0.0, 0.0, 0.0, 1.0],
            depth_test: true,
            clear_depth: 1.0,
        };
        assert!(log.commands().contains(&GpuCommand::SetClearState(black)));
    }

    #[test]
    fn init_reports_progress() {
        let mut pipeline = new_pipeline();
        let mut statuses = Vec::new();
        let surface = RecordingSurface::new(SIZE);
        pipeline
            .init(owned(surface), |s| statuses.push(s.to_owned()))
            .unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[1].contains("initialized"));
    }

    #[test]
    fn each_setup_step_maps_to_its_error() {
        let plan = FailurePlan {
            context: true,
            ..Default::default()
        };
        let err = failing(plan);
        assert!(matches!(err, PipelineError::ContextUnavailable(_)));

        let plan = FailurePlan {
            compile: Some(ShaderStage::Fragment),
            ..Default::default()
        };
        let err = failing(plan);
        let PipelineError::ShaderCompile { stage, diagnostic } = &err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(*stage, ShaderStage::Fragment);
        assert!(diagnostic.contains("rejected"));
        assert_eq!(err.class(), ErrorClass::Compile);

        let plan = FailurePlan {
            link: true,
            ..Default::default()
        };
        let err = failing(plan);
        assert!(matches!(err, PipelineError::Link(_)));
        assert_eq!(err.class(), ErrorClass::Link);

        let plan = FailurePlan {
            missing_binding: Some("u_matrix".into()),
            ..Default::default()
        };
        assert_eq!(failing(plan), PipelineError::MissingBinding("u_matrix"));

        let plan = FailurePlan {
            buffer: Some(BufferTarget::ElementArray),
            ..Default::default()
        };
        let err = failing(plan);
        let PipelineError::BufferAllocation { buffer, .. } = &err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(*buffer, "index");
    }

    #[test]
    fn vertex_compile_failure_stops_before_fragment() {
        let plan = FailurePlan {
            compile: Some(ShaderStage::Vertex),
            ..Default::default()
        };
        let surface = RecordingSurface::with_plan(SIZE, plan);
        let log = surface.log();
        let mut pipeline = new_pipeline();
        pipeline.init(owned(surface), |_| {}).unwrap_err();
        let fragment = GpuCommand::CompileShader {
            stage: ShaderStage::Fragment,
        };
        assert!(!log.commands().contains(&fragment));
    }

    #[test]
    fn degenerate_depth_range_fails_init() {
        let mut pipeline = Pipeline::new(PipelineConfig {
            near: 1.0,
            far: 1.0,
            ..Default::default()
        });
        let err = pipeline
            .init(owned(RecordingSurface::new(SIZE)), |_| {})
            .unwrap_err();
        assert!(matches!(err, PipelineError::Camera(_)));
    }

    #[test]
    fn render_before_ready_is_rejected_without_touching_matrices() {
        let not_ready = |state| RenderError::Input(InputError::NotReady { state });
        let mut pipeline = new_pipeline();
        let before = *pipeline.matrices();
        let err = pipeline.render(&SceneData::new(1.0)).unwrap_err();
        assert_eq!(err, not_ready("uninitialized"));
        assert_eq!(*pipeline.matrices(), before);
        assert_eq!(pipeline.state(), &PipelineState::Uninitialized);

        pipeline.init(None, |_| {}).unwrap_err();
        let err = pipeline.render(&SceneData::new(1.0)).unwrap_err();
        assert_eq!(err, not_ready("failed"));
    }

    #[test]
    fn render_issues_the_command_sequence() {
        let (mut pipeline, log) = ready_pipeline();
        log.clear();
        let report = pipeline.render(&SceneData::new(0.5)).unwrap();
        assert_eq!(report.index_count, 36);
        assert_eq!(report.frame_index, 1);
        assert_eq!(pipeline.state(), &PipelineState::Rendering);

        let cmds = log.commands();
        assert_eq!(cmds.len(), 8);
        assert_eq!(cmds[0], GpuCommand::Clear);
        assert_eq!(cmds[1], GpuCommand::Viewport(SIZE));
        assert!(matches!(cmds[2], GpuCommand::UseProgram { .. }));

        let attributes: Vec<_> = cmds[3..5].iter().filter_map(attribute_binding).collect();
        assert_eq!(
            attributes,
            vec![
                (AttributeLocation(0), VertexLayout::VEC3),
                (AttributeLocation(1), VertexLayout::VEC3),
            ]
        );

        let upload = GpuCommand::UniformMatrix {
            location: UniformLocation(0),
            matrix: report.mvp,
        };
        assert_eq!(cmds[5], upload);
        match &cmds[6] {
            GpuCommand::BindIndexBuffer { format, .. } => assert_eq!(*format, IndexFormat::Uint16),
            other => panic!("unexpected command {other:?}"),
        }
        let draw = GpuCommand::DrawIndexed {
            topology: Topology::TriangleList,
            count: 36,
        };
        assert_eq!(cmds[7], draw);
    }

    #[test]
    fn mvp_is_projection_times_view_times_model() {
        let (mut pipeline, log) = ready_pipeline();
        pipeline.render(&SceneData::new(0.7)).unwrap();
        let m = *pipeline.matrices();

        let mut model = Matrix4::IDENTITY;
        mat4::rotate_y(&mut model, &Matrix4::IDENTITY, 0.7);
        assert_eq!(m.model, model);

        let model = glam::Mat4::from(model);
        let view = glam::Mat4::from(m.view);
        let projection = glam::Mat4::from(m.projection);
        let expected = projection * view * model;
        assert!(m.mvp.approx_eq(&expected.into(), 1e-5));
        assert_eq!(log.last_matrix(), Some(m.mvp));

        let reversed = model * view * projection;
        assert!(!m.mvp.approx_eq(&reversed.into(), 1e-3));
    }

    #[test]
    fn invalid_scene_is_rejected_and_next_frame_recovers() {
        let (mut pipeline, log) = ready_pipeline();
        pipeline.render(&SceneData::new(0.1)).unwrap();
        let before = *pipeline.matrices();
        let err = pipeline.render(&SceneData::new(f64::NAN)).unwrap_err();
        let RenderError::Input(error) = &err else {
            panic!("unexpected error {err:?}");
        };
        assert!(matches!(error, InputError::InvalidField { .. }));
        assert_eq!(*pipeline.matrices(), before);
        pipeline.render(&SceneData::new(0.2)).unwrap();
        assert_eq!(log.draws(), vec![36, 36]);
    }

    #[test]
    fn draw_failure_is_transient() {
        let plan = FailurePlan {
            draw: true,
            ..Default::default()
        };
        let surface = RecordingSurface::with_plan(SIZE, plan);
        let mut pipeline = new_pipeline();
        pipeline.init(owned(surface), |_| {}).unwrap();
        let err = pipeline.render(&SceneData::new(0.0)).unwrap_err();
        assert!(matches!(err, RenderError::Frame(_)));
        assert_eq!(pipeline.state(), &PipelineState::Ready);
    }

    #[test]
    fn viewport_follows_surface_resizes() {
        let shared = Arc::new(Mutex::new(RecordingSurface::new(SIZE)));
        let log = shared.lock().unwrap().log();
        let mut pipeline = new_pipeline();
        pipeline
            .init(Some(SurfaceHandle::Shared(Arc::clone(&shared))), |_| {})
            .unwrap();
        assert!(pipeline.is_degraded());

        shared.lock().unwrap().resize(SurfaceSize::new(320, 200));
        pipeline.render(&SceneData::new(0.0)).unwrap();
        let resized = GpuCommand::Viewport(SurfaceSize::new(320, 200));
        assert!(log.commands().contains(&resized));
    }

    #[test]
    fn reinit_on_a_bound_surface_fails_with_context_unavailable() {
        let shared = Arc::new(Mutex::new(RecordingSurface::new(SIZE)));
        let mut pipeline = new_pipeline();
        pipeline
            .init(Some(SurfaceHandle::Shared(Arc::clone(&shared))), |_| {})
            .unwrap();
        let err = pipeline
            .init(Some(SurfaceHandle::Shared(shared)), |_| {})
            .unwrap_err();
        assert!(matches!(err, PipelineError::ContextUnavailable(_)));

        pipeline
            .init(owned(RecordingSurface::new(SIZE)), |_| {})
            .unwrap();
        assert_eq!(pipeline.state(), &PipelineState::Ready);
    }
}
