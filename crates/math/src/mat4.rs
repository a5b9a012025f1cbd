//! Output-parameter matrix builders.
//!
//! Each function writes into `out` and hands it back so calls can be chained.
//! Rust will not let `out` alias an input, so the aliasing cases get their own
//! in-place entry points (`multiply_assign`, `premultiply`, `*_in_place`). They
//! read every input element into temporaries before the first write, which is
//! what makes `mvp = projection * (view * model)` safe to build in one buffer.

use crate::{MathError, Matrix4, Vector3};

/// `a * b` into a stack temporary.
#[inline]
fn product(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        let b0 = b[col * 4];
        let b1 = b[col * 4 + 1];
        let b2 = b[col * 4 + 2];
        let b3 = b[col * 4 + 3];
        for row in 0..4 {
            out[col * 4 + row] = b0 * a[row] + b1 * a[4 + row] + b2 * a[8 + row] + b3 * a[12 + row];
        }
    }
    out
}

/// Set `out` to the identity.
pub fn identity(out: &mut Matrix4) -> &mut Matrix4 {
    *out = Matrix4::IDENTITY;
    out
}

/// `out = a * b`.
pub fn multiply<'a>(out: &'a mut Matrix4, a: &Matrix4, b: &Matrix4) -> &'a mut Matrix4 {
    out.0 = product(&a.0, &b.0);
    out
}

/// `out = out * b`; the aliased-left form of [`multiply`].
pub fn multiply_assign<'a>(out: &'a mut Matrix4, b: &Matrix4) -> &'a mut Matrix4 {
    out.0 = product(&out.0, &b.0);
    out
}

/// `out = a * out`; the aliased-right form of [`multiply`].
pub fn premultiply<'a>(out: &'a mut Matrix4, a: &Matrix4) -> &'a mut Matrix4 {
    out.0 = product(&a.0, &out.0);
    out
}

/// `out = a * T(v)`.
pub fn translate<'a>(out: &'a mut Matrix4, a: &Matrix4, v: Vector3) -> &'a mut Matrix4 {
    *out = *a;
    translate_in_place(out, v)
}

/// `out = out * T(v)`. Only the translation column is written.
pub fn translate_in_place(out: &mut Matrix4, v: Vector3) -> &mut Matrix4 {
    let m = &mut out.0;
    let (x, y, z) = (v.x, v.y, v.z);
    for row in 0..4 {
        m[12 + row] = m[row] * x + m[4 + row] * y + m[8 + row] * z + m[12 + row];
    }
    out
}

/// Rotate the pair of basis columns `(p, q)` by `(c, s)`:
/// `p' = p * c + q * s`, `q' = q * c - p * s`.
#[inline]
fn rotate_columns(m: &mut [f32; 16], p: usize, q: usize, c: f32, s: f32) {
    for row in 0..4 {
        let mp = m[p * 4 + row];
        let mq = m[q * 4 + row];
        m[p * 4 + row] = mp * c + mq * s;
        m[q * 4 + row] = mq * c - mp * s;
    }
}

/// `out = a * Rx(rad)`.
pub fn rotate_x<'a>(out: &'a mut Matrix4, a: &Matrix4, rad: f32) -> &'a mut Matrix4 {
    *out = *a;
    rotate_x_in_place(out, rad)
}

/// `out = out * Rx(rad)`. Columns 0 and 3 are left as they are.
pub fn rotate_x_in_place(out: &mut Matrix4, rad: f32) -> &mut Matrix4 {
    let (s, c) = rad.sin_cos();
    rotate_columns(&mut out.0, 1, 2, c, s);
    out
}

/// `out = a * Ry(rad)`.
pub fn rotate_y<'a>(out: &'a mut Matrix4, a: &Matrix4, rad: f32) -> &'a mut Matrix4 {
    *out = *a;
    rotate_y_in_place(out, rad)
}

/// `out = out * Ry(rad)`. Columns 1 and 3 are left as they are.
pub fn rotate_y_in_place(out: &mut Matrix4, rad: f32) -> &mut Matrix4 {
    let (s, c) = rad.sin_cos();
    // Right-handed about +Y: x' = x c - z s, z' = x s + z c.
    rotate_columns(&mut out.0, 2, 0, c, s);
    out
}

/// `out = a * Rz(rad)`.
pub fn rotate_z<'a>(out: &'a mut Matrix4, a: &Matrix4, rad: f32) -> &'a mut Matrix4 {
    *out = *a;
    rotate_z_in_place(out, rad)
}

/// `out = out * Rz(rad)`. Columns 2 and 3 are left as they are.
pub fn rotate_z_in_place(out: &mut Matrix4, rad: f32) -> &mut Matrix4 {
    let (s, c) = rad.sin_cos();
    rotate_columns(&mut out.0, 0, 1, c, s);
    out
}

/// Symmetric-frustum perspective projection in GL clip conventions
/// (depth mapped to `[-w, w]`, `out[11] = -1`).
///
/// `fovy` is the vertical field of view in radians and `aspect` is
/// `width / height`. Coincident planes are rejected and `out` is left
/// untouched.
pub fn perspective(
    out: &mut Matrix4,
    fovy: f32,
    aspect: f32,
    near: f32,
    far: f32,
) -> Result<&mut Matrix4, MathError> {
    if near == far {
        return Err(MathError::DegenerateDepthRange(near));
    }
    let f = 1.0 / (fovy / 2.0).tan();
    let nf = 1.0 / (near - far);

    #[rustfmt::skip]
    let values = [
        f / aspect, 0.0, 0.0,                     0.0,
        0.0,        f,   0.0,                     0.0,
        0.0,        0.0, (far + near) * nf,      -1.0,
        0.0,        0.0, 2.0 * far * near * nf,   0.0,
    ];
    out.0 = values;
    Ok(out)
}

/// Right-handed view matrix looking from `eye` towards `center`.
///
/// The basis is built by Gram-Schmidt: forward = normalize(eye - center),
/// right = normalize(up x forward), up' = normalize(forward x right).
/// `up` parallel to the view direction (or `eye == center`) yields NaN; the
/// caller guarantees non-degenerate input.
pub fn look_at(out: &mut Matrix4, eye: Vector3, center: Vector3, up: Vector3) -> &mut Matrix4 {
    let z = eye - center;
    let z = z / z.length();

    let x = up.cross(z);
    let x = x / x.length();

    let y = z.cross(x);
    let y = y / y.length();

    #[rustfmt::skip]
    let values = [
        x.x,          y.x,          z.x,          0.0,
        x.y,          y.y,          z.y,          0.0,
        x.z,          y.z,          z.z,          0.0,
        -x.dot(eye), -y.dot(eye), -z.dot(eye),    1.0,
    ];
    out.0 = values;
    out
}
