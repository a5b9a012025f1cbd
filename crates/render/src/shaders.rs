//! Fixed program text and the binding table it declares.
//!
//! Vertex positions are transformed by a GL-style clip matrix (depth in
//! `[-w, w]`); the vertex stage remaps depth to `[0, w]` before output.

use crate::gpu::{AttributeBinding, ProgramInterface, UniformBinding, VertexLayout};

pub const POSITION_ATTRIBUTE: &str = "a_position";
pub const COLOR_ATTRIBUTE: &str = "a_color";
pub const MATRIX_UNIFORM: &str = "u_matrix";

pub const VERTEX_SHADER: &str = r#"
@group(0) @binding(0)
var<uniform> u_matrix: mat4x4<f32>;

struct VertexInput {
    @location(0) a_position: vec3<f32>,
    @location(1) a_color: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) v_color: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let clip = u_matrix * vec4<f32>(in.a_position, 1.0);
    var out: VertexOutput;
    out.clip_position = vec4<f32>(clip.xy, (clip.z + clip.w) * 0.5, clip.w);
    out.v_color = in.a_color;
    return out;
}
"#;

pub const FRAGMENT_SHADER: &str = r#"
@fragment
fn fs_main(@location(0) v_color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(v_color, 1.0);
}
"#;

pub const CUBE_INTERFACE: ProgramInterface = ProgramInterface {
    attributes: &[
        AttributeBinding {
            name: POSITION_ATTRIBUTE,
            location: 0,
            layout: VertexLayout::VEC3,
        },
        AttributeBinding {
            name: COLOR_ATTRIBUTE,
            location: 1,
            layout: VertexLayout::VEC3,
        },
    ],
    uniforms: &[UniformBinding {
        name: MATRIX_UNIFORM,
        binding: 0,
    }],
    vertex_entry: "vs_main",
    fragment_entry: "fs_main",
};
