/// Number of shared cube corners.
pub const VERTEX_COUNT: usize = 8;
/// Indices in the triangle list; the draw call depends on this exact value.
pub const INDEX_COUNT: usize = 36;
/// Quad faces, each split into two triangles.
pub const FACE_COUNT: usize = 6;

/// Positions, per-vertex colours and a triangle index list for a unit cube
/// centred on the origin.
#[derive(Debug)]
pub struct CubeMesh {
    pub positions: [[f32; 3]; VERTEX_COUNT],
    pub colors: [[f32; 3]; VERTEX_COUNT],
    pub indices: [u16; INDEX_COUNT],
}

#[rustfmt::skip]
pub static CUBE: CubeMesh = CubeMesh {
    positions: [
        // front (+Z)
        [-0.5, -0.5,  0.5],
        [ 0.5, -0.5,  0.5],
        [ 0.5,  0.5,  0.5],
        [-0.5,  0.5,  0.5],
        // back (-Z)
        [-0.5, -0.5, -0.5],
        [ 0.5, -0.5, -0.5],
        [ 0.5,  0.5, -0.5],
        [-0.5,  0.5, -0.5],
    ],
    colors: [
        [1.0, 0.0, 0.0], // red
        [0.0, 1.0, 0.0], // green
        [0.0, 0.0, 1.0], // blue
        [1.0, 1.0, 0.0], // yellow
        [1.0, 0.0, 1.0], // magenta
        [0.0, 1.0, 1.0], // cyan
        [0.5, 0.5, 0.5], // grey
        [1.0, 1.0, 1.0], // white
    ],
    indices: [
        0, 1, 2,  0, 2, 3, // front
        4, 5, 6,  4, 6, 7, // back
        3, 2, 6,  3, 6, 7, // top
        0, 1, 5,  0, 5, 4, // bottom
        1, 5, 6,  1, 6, 2, // right
        0, 4, 7,  0, 7, 3, // left
    ],
};

impl CubeMesh {
    /// Index count as the draw call wants it.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// The two triangles of each quad face, in table order.
    pub fn faces(&self) -> impl Iterator<Item = [[u16; 3]; 2]> + '_ {
        self.indices
            .chunks_exact(6)
            .map(|f| [[f[0], f[1], f[2]], [f[3], f[4], f[5]]])
    }
}
