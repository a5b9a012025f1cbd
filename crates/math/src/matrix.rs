use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// A 4x4 matrix of `f32` stored column-major, matching WGSL `mat4x4<f32>`.
///
/// Element `[c * 4 + r]` is row `r` of column `c`; the translation lives in
/// elements 12..15.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Matrix4(pub [f32; 16]);

impl Matrix4 {
    #[rustfmt::skip]
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub const fn from_cols_array(values: [f32; 16]) -> Self {
        Self(values)
    }

    pub fn as_array(&self) -> &[f32; 16] {
        &self.0
    }

    /// Column `c` as four floats.
    pub fn col(&self, c: usize) -> [f32; 4] {
        let i = c * 4;
        [self.0[i], self.0[i + 1], self.0[i + 2], self.0[i + 3]]
    }

    /// Column-major nested arrays, the layout a uniform upload expects.
    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        [self.col(0), self.col(1), self.col(2), self.col(3)]
    }

    /// Multiply a homogeneous vector: `self * v`.
    pub fn transform_vec4(&self, v: [f32; 4]) -> [f32; 4] {
        let m = &self.0;
        let mut out = [0.0; 4];
        for (r, slot) in out.iter_mut().enumerate() {
            *slot = m[r] * v[0] + m[4 + r] * v[1] + m[8 + r] * v[2] + m[12 + r] * v[3];
        }
        out
    }

    /// Transform a point (w = 1) without perspective division.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let [x, y, z, _] = self.transform_vec4([p.x, p.y, p.z, 1.0]);
        Vec3::new(x, y, z)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Element-wise comparison within `epsilon`.
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for Matrix4 {
    fn from(m: Mat4) -> Self {
        Self(m.to_cols_array())
    }
}

impl From<Matrix4> for Mat4 {
    fn from(m: Matrix4) -> Self {
        Mat4::from_cols_array(&m.0)
    }
}
