//! Crunch engine crate.
//!
//! Renderable [`Primitive`]s built on a small device / draw-context seam
//! ([`backend`]), plus the window and GPU runtime that drives them on `wgpu`.

pub mod backend;
pub mod core;
pub mod device;
pub mod logging;
pub mod primitive;
pub mod shader;
pub mod texture;
pub mod transform;
pub mod window;

pub use primitive::{Primitive, PrimitiveError, PrimitiveStage, Vertex};
