use serde::{Deserialize, Serialize};
use splitcube_math::Matrix4;

use crate::SurfaceSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    /// Per-vertex attribute data.
    Array,
    /// Triangle indices.
    ElementArray,
}

/// Usage hint for an uploaded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Float32,
}

/// How one attribute reads its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub components: u8,
    pub component_type: ComponentType,
    pub normalized: bool,
    /// Zero means tightly packed.
    pub stride: u32,
}

impl VertexLayout {
    /// Three packed, unnormalized floats.
    pub const VEC3: Self = Self {
        components: 3,
        component_type: ComponentType::Float32,
        normalized: false,
        stride: 0,
    };

    pub fn byte_stride(&self) -> u32 {
        if self.stride != 0 {
            return self.stride;
        }
        let size = match self.component_type {
            ComponentType::Float32 => 4,
        };
        u32::from(self.components) * size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
}

/// Resolved attribute binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLocation(pub u32);

/// Resolved uniform binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// A named vertex input the program declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: &'static str,
    pub location: u32,
    pub layout: VertexLayout,
}

/// A named uniform block the program declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub name: &'static str,
    pub binding: u32,
}

/// Names and slots a linked program exposes.
///
/// Backends without shader reflection link against this table; lookups by
/// name resolve through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramInterface {
    pub attributes: &'static [AttributeBinding],
    pub uniforms: &'static [UniformBinding],
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

impl ProgramInterface {
    pub fn attribute(&self, name: &str) -> Option<&AttributeBinding> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformBinding> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}

/// Fixed state applied once when a context is set up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearState {
    pub color: [f32; 4],
    /// Depth test with less-or-equal compare.
    pub depth_test: bool,
    pub clear_depth: f32,
}

impl Default for ClearState {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth_test: true,
            clear_depth: 1.0,
        }
    }
}

/// The command surface the pipeline drives.
///
/// Mirrors an immediate-mode GL context: handles are opaque, calls are
/// synchronous, and a draw uses whatever was bound before it. Failures carry
/// the backend's diagnostic text.
pub trait GpuContext: Send {
    type Shader;
    type Program: Send;
    type Buffer: Send;

    fn set_clear_state(&mut self, state: &ClearState);

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;

    /// Link two compiled stages. The shader objects are consumed either way.
    fn link_program(
        &mut self,
        vertex: Self::Shader,
        fragment: Self::Shader,
        interface: &ProgramInterface,
    ) -> Result<Self::Program, String>;

    fn attribute_location(&self, program: &Self::Program, name: &str) -> Option<AttributeLocation>;

    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<UniformLocation>;

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<Self::Buffer, String>;

    /// Clear colour and depth.
    fn clear(&mut self);

    fn set_viewport(&mut self, size: SurfaceSize);

    fn use_program(&mut self, program: &Self::Program);

    fn bind_vertex_attribute(
        &mut self,
        location: AttributeLocation,
        buffer: &Self::Buffer,
        layout: VertexLayout,
    );

    /// Upload a column-major matrix as-is (no transpose).
    fn set_uniform_matrix(&mut self, location: UniformLocation, matrix: &Matrix4);

    fn bind_index_buffer(&mut self, buffer: &Self::Buffer, format: IndexFormat);

    fn draw_indexed(&mut self, topology: Topology, count: u32) -> Result<(), String>;
}

/// Errors acquiring a context from a surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    #[error("surface is already bound to a rendering context")]
    AlreadyBound,
    #[error("no compatible GPU adapter: {0}")]
    NoAdapter(String),
    #[error("device request failed: {0}")]
    Device(String),
    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),
}
