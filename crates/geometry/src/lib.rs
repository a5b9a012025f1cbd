//! Geometry Table: the one canonical cube the pipeline uploads.
//!
//! # Invariants
//! - Tables are immutable for the process lifetime.
//! - Exactly [`INDEX_COUNT`] indices, all below [`VERTEX_COUNT`], two triangles per face.

mod cube;

pub use cube::{CUBE, CubeMesh, FACE_COUNT, INDEX_COUNT, VERTEX_COUNT};
