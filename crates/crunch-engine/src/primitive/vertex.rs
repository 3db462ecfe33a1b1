use bytemuck::{Pod, Zeroable};

use crate::backend::{VertexElement, VertexFormat};

/// Vertex record shared by every primitive.
///
/// [`Vertex::ELEMENTS`] is the input layout derived from this struct; shaders
/// read position at location 0, color at 1 and texture coordinate at 2.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    pub const ELEMENTS: [VertexElement; 3] = [
        VertexElement {
            semantic: "POSITION",
            format: VertexFormat::Float32x4,
            offset: 0,
            location: 0,
        },
        VertexElement {
            semantic: "COLOR",
            format: VertexFormat::Float32x4,
            offset: 16,
            location: 1,
        },
        VertexElement {
            semantic: "TEXCOORD",
            format: VertexFormat::Float32x2,
            offset: 32,
            location: 2,
        },
    ];

    pub const fn new(position: [f32; 4], color: [f32; 4], uv: [f32; 2]) -> Self {
        Self { position, color, uv }
    }
}
