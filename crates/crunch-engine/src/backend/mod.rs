//! Device / draw-context seam.
//!
//! A [`GpuDevice`] creates GPU objects; a [`DrawContext`] records commands that
//! reference them. Primitives are written against these two traits only, so the
//! same lifecycle code drives the `wgpu` backend and the headless
//! [`recording`] backend.
//!
//! Ownership convention:
//! - every object returned by a `create_*` call is exclusively owned by the caller
//!   and released when dropped
//! - the device itself is shared and never released by its users

pub mod recording;
pub mod wgpu_device;

use thiserror::Error;

use crate::shader::ShaderProgram;
use crate::texture::TextureImage;

pub use recording::{Command, RecordingContext, RecordingDevice};
pub use wgpu_device::{WgpuDevice, WgpuDrawContext};

/// Update class of a GPU buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    /// Contents are fixed at creation.
    Immutable,
    /// GPU read/write; contents may be updated after creation.
    Default,
}

/// Pipeline stage a buffer is bound to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferBinding {
    Vertex,
    Index,
}

/// Buffer creation request. `contents` is copied; its length is the buffer size.
#[derive(Debug, Copy, Clone)]
pub struct BufferDesc<'a> {
    pub label: Option<&'a str>,
    pub usage: BufferUsage,
    pub binding: BufferBinding,
    pub contents: &'a [u8],
}

/// Format of one vertex element.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x4,
}

impl VertexFormat {
    /// Size in bytes.
    pub const fn size(self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// One entry of an input layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexElement {
    pub semantic: &'static str,
    pub format: VertexFormat,
    pub offset: u64,
    pub location: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum IndexFormat {
    Uint32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    TriangleList,
}

/// Pipeline link request: input layout + topology + both shader stages.
pub struct PipelineDesc<'a, D: GpuDevice + ?Sized> {
    pub label: Option<&'a str>,
    pub vertex_shader: &'a D::Shader,
    pub pixel_shader: &'a D::Shader,
    pub input_layout: &'a D::InputLayout,
    pub topology: Topology,
}

/// Failure reported by a device creation call.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DeviceError {
    /// The request itself is malformed (zero size, over a device limit, stage mismatch).
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Shader code could not be compiled or validated.
    #[error("shader compilation failed: {0}")]
    Compilation(String),

    /// The device refused an otherwise well-formed request.
    #[error("device rejected the request: {0}")]
    Rejected(String),
}

/// Creates GPU objects.
pub trait GpuDevice {
    type Buffer;
    type Shader;
    type InputLayout;
    type Pipeline;
    type Texture;

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, DeviceError>;

    /// Creates a shader object. Source programs are compiled by the device first.
    fn create_shader(
        &self,
        program: &ShaderProgram,
        label: Option<&str>,
    ) -> Result<Self::Shader, DeviceError>;

    fn create_input_layout(
        &self,
        elements: &[VertexElement],
        stride: u64,
        vertex_shader: &Self::Shader,
    ) -> Result<Self::InputLayout, DeviceError>;

    fn create_pipeline(&self, desc: &PipelineDesc<'_, Self>) -> Result<Self::Pipeline, DeviceError>;

    /// Creates a sampled 2D texture (plus its sampler) from RGBA8 pixels.
    fn create_texture(
        &self,
        image: &TextureImage,
        label: Option<&str>,
    ) -> Result<Self::Texture, DeviceError>;
}

/// Records rendering commands against objects created by `D`.
pub trait DrawContext<D: GpuDevice + ?Sized> {
    fn bind_texture(&mut self, slot: u32, texture: &D::Texture);

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: &D::Buffer, stride: u64, offset: u64);

    fn bind_index_buffer(&mut self, buffer: &D::Buffer, format: IndexFormat, offset: u64);

    /// Binds input layout, topology and both shader stages at once.
    fn set_pipeline(&mut self, pipeline: &D::Pipeline);

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32);
}
