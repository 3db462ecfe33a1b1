//! Window-bound GPU context.
//!
//! [`Gpu`] owns the wgpu instance, surface, device and queue for one window and
//! hands out the shared [`WgpuDevice`](crate::backend::WgpuDevice) that
//! primitives create their resources through.

mod frame;
mod gpu;
mod init;
mod surface;

pub use frame::GpuFrame;
pub use gpu::Gpu;
pub use init::GpuInit;
pub use surface::SurfaceErrorAction;
