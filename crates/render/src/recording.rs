//! Headless backend: records every command instead of touching a GPU.
//!
//! Used by tests and by the CLI's recording runs. Failures can be injected at
//! each step of pipeline setup through a [`FailurePlan`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use splitcube_math::Matrix4;

use crate::gpu::{
    AttributeLocation, BufferTarget, BufferUsage, ClearState, GpuContext, GpuError, IndexFormat,
    ProgramInterface, ShaderStage, Topology, UniformLocation, VertexLayout,
};
use crate::surface::{Surface, SurfaceSize};

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateContext,
    SetClearState(ClearState),
    CompileShader { stage: ShaderStage },
    ReleaseShader { stage: ShaderStage },
    LinkProgram { program: u32 },
    CreateBuffer {
        buffer: u32,
        target: BufferTarget,
        len: usize,
        usage: BufferUsage,
    },
    Clear,
    Viewport(SurfaceSize),
    UseProgram { program: u32 },
    BindAttribute {
        location: AttributeLocation,
        buffer: u32,
        layout: VertexLayout,
    },
    UniformMatrix {
        location: UniformLocation,
        matrix: Matrix4,
    },
    BindIndexBuffer { buffer: u32, format: IndexFormat },
    DrawIndexed { topology: Topology, count: u32 },
}

/// Shared, cloneable view of the commands a context has issued.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<GpuCommand>>>);

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<GpuCommand>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, command: GpuCommand) {
        self.entries().push(command);
    }

    pub fn commands(&self) -> Vec<GpuCommand> {
        self.entries().clone()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index counts of every draw issued so far.
    pub fn draws(&self) -> Vec<u32> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                GpuCommand::DrawIndexed { count, .. } => Some(count),
                _ => None,
            })
            .collect()
    }

    /// The most recent matrix uploaded to any uniform.
    pub fn last_matrix(&self) -> Option<Matrix4> {
        self.commands().into_iter().rev().find_map(|c| match c {
            GpuCommand::UniformMatrix { matrix, .. } => Some(matrix),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}

/// Which setup step should fail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailurePlan {
    pub context: bool,
    pub compile: Option<ShaderStage>,
    pub link: bool,
    /// Attribute or uniform name that will not resolve.
    pub missing_binding: Option<String>,
    pub buffer: Option<BufferTarget>,
    pub draw: bool,
}

#[derive(Debug)]
pub struct RecordingSurface {
    size: SurfaceSize,
    bound: bool,
    log: CommandLog,
    plan: FailurePlan,
}

impl RecordingSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self::with_plan(size, FailurePlan::default())
    }

    pub fn with_plan(size: SurfaceSize, plan: FailurePlan) -> Self {
        Self {
            size,
            bound: false,
            log: CommandLog::new(),
            plan,
        }
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    pub fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
    }
}

impl Surface for RecordingSurface {
    type Context = RecordingContext;

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn create_context(&mut self) -> Result<RecordingContext, GpuError> {
        self.log.push(GpuCommand::CreateContext);
        if self.plan.context {
            return Err(GpuError::SurfaceUnavailable(
                "context creation disabled".into(),
            ));
        }
        if self.bound {
            return Err(GpuError::AlreadyBound);
        }
        self.bound = true;
        Ok(RecordingContext {
            log: self.log.clone(),
            plan: self.plan.clone(),
            next_handle: 1,
        })
    }
}

#[derive(Debug)]
pub struct RecordingShader {
    stage: ShaderStage,
}

#[derive(Debug)]
pub struct RecordingProgram {
    id: u32,
    interface: ProgramInterface,
}

#[derive(Debug)]
pub struct RecordingBuffer {
    id: u32,
}

#[derive(Debug)]
pub struct RecordingContext {
    log: CommandLog,
    plan: FailurePlan,
    next_handle: u32,
}

impl RecordingContext {
    fn handle(&mut self) -> u32 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn resolves(&self, name: &str) -> bool {
        self.plan.missing_binding.as_deref() != Some(name)
    }
}

impl GpuContext for RecordingContext {
    type Shader = RecordingShader;
    type Program = RecordingProgram;
    type Buffer = RecordingBuffer;

    fn set_clear_state(&mut self, state: &ClearState) {
        self.log.push(GpuCommand::SetClearState(*state));
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<RecordingShader, String> {
        self.log.push(GpuCommand::CompileShader { stage });
        if self.plan.compile == Some(stage) || source.trim().is_empty() {
            return Err(format!("ERROR: 0:1: {stage} shader rejected"));
        }
        Ok(RecordingShader { stage })
    }

    fn link_program(
        &mut self,
        vertex: RecordingShader,
        fragment: RecordingShader,
        interface: &ProgramInterface,
    ) -> Result<RecordingProgram, String> {
        let linked = if self.plan.link {
            Err("link failed: varyings do not match".to_owned())
        } else {
            let id = self.handle();
            self.log.push(GpuCommand::LinkProgram { program: id });
            Ok(RecordingProgram {
                id,
                interface: *interface,
            })
        };
        for shader in [vertex, fragment] {
            self.log.push(GpuCommand::ReleaseShader {
                stage: shader.stage,
            });
        }
        linked
    }

    fn attribute_location(
        &self,
        program: &RecordingProgram,
        name: &str,
    ) -> Option<AttributeLocation> {
        if !self.resolves(name) {
            return None;
        }
        program
            .interface
            .attribute(name)
            .map(|a| AttributeLocation(a.location))
    }

    fn uniform_location(&self, program: &RecordingProgram, name: &str) -> Option<UniformLocation> {
        if !self.resolves(name) {
            return None;
        }
        program
            .interface
            .uniform(name)
            .map(|u| UniformLocation(u.binding))
    }

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<RecordingBuffer, String> {
        if self.plan.buffer == Some(target) {
            return Err("out of memory".into());
        }
        let id = self.handle();
        self.log.push(GpuCommand::CreateBuffer {
            buffer: id,
            target,
            len: data.len(),
            usage,
        });
        Ok(RecordingBuffer { id })
    }

    fn clear(&mut self) {
        self.log.push(GpuCommand::Clear);
    }

    fn set_viewport(&mut self, size: SurfaceSize) {
        self.log.push(GpuCommand::Viewport(size));
    }

    fn use_program(&mut self, program: &RecordingProgram) {
        self.log.push(GpuCommand::UseProgram {
            program: program.id,
        });
    }

    fn bind_vertex_attribute(
        &mut self,
        location: AttributeLocation,
        buffer: &RecordingBuffer,
        layout: VertexLayout,
    ) {
        self.log.push(GpuCommand::BindAttribute {
            location,
            buffer: buffer.id,
            layout,
        });
    }

    fn set_uniform_matrix(&mut self, location: UniformLocation, matrix: &Matrix4) {
        self.log.push(GpuCommand::UniformMatrix {
            location,
            matrix: *matrix,
        });
    }

    fn bind_index_buffer(&mut self, buffer: &RecordingBuffer, format: IndexFormat) {
        self.log.push(GpuCommand::BindIndexBuffer {
            buffer: buffer.id,
            format,
        });
    }

    fn draw_indexed(&mut self, topology: Topology, count: u32) -> Result<(), String> {
        if self.plan.draw {
            return Err("device lost".into());
        }
        self.log.push(GpuCommand::DrawIndexed { topology, count });
        Ok(())
    }
}
