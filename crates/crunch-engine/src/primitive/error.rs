use std::fmt;

use thiserror::Error;

use super::PrimitiveStage;
use crate::backend::DeviceError;
use crate::shader::ShaderError;
use crate::texture::TextureError;

/// GPU object a primitive creates.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    VertexShader,
    PixelShader,
    InputLayout,
    Pipeline,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::VertexBuffer => "vertex buffer",
            ResourceKind::IndexBuffer => "index buffer",
            ResourceKind::VertexShader => "vertex shader",
            ResourceKind::PixelShader => "pixel shader",
            ResourceKind::InputLayout => "input layout",
            ResourceKind::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("failed to create {resource}")]
    ResourceCreation {
        resource: ResourceKind,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    ShaderResolution(#[from] ShaderError),

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error("`{operation}` is not allowed while the primitive is {stage}")]
    InvalidState {
        operation: &'static str,
        stage: PrimitiveStage,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("the graphics device was dropped before the primitive")]
    DeviceLost,
}
