use std::fmt;

/// Lifecycle stage of a [`super::Primitive`].
///
/// Stages only move forward:
/// `Uninitialized → Initialized → ShadersBound → Ready`, and any stage moves to
/// `Released` on shutdown.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrimitiveStage {
    /// Constructed; no GPU objects yet.
    Uninitialized,
    /// Vertex/index buffers and texture exist.
    Initialized,
    /// Vertex shader and input layout exist.
    ShadersBound,
    /// Pixel shader and pipeline exist; the primitive can render.
    Ready,
    /// Shut down; every owned GPU object has been released.
    Released,
}

impl fmt::Display for PrimitiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveStage::Uninitialized => "uninitialized",
            PrimitiveStage::Initialized => "initialized",
            PrimitiveStage::ShadersBound => "shaders bound",
            PrimitiveStage::Ready => "ready",
            PrimitiveStage::Released => "released",
        };
        f.write_str(name)
    }
}
