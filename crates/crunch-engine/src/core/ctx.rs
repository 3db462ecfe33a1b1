use std::time::Duration;

use winit::window::{Window, WindowId};

use crate::backend::WgpuDrawContext;
use crate::device::{Gpu, SurfaceErrorAction};
use crate::window::RuntimeCtx;

use super::app::AppControl;

pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

/// Timing of the current frame.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Since the window was created.
    pub elapsed: Duration,
    pub frame_index: u64,
}

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_, '_> {
    /// Acquires a frame, clears it to `clear`, lets `draw` record into the
    /// pass, then presents.
    ///
    /// Surface errors skip the frame; a fatal one returns [`AppControl::Exit`].
    /// An error from `draw` is returned after the frame is presented.
    pub fn render<F, E>(&mut self, clear: wgpu::Color, draw: F) -> Result<AppControl, E>
    where
        F: FnOnce(&mut WgpuDrawContext<'_, '_>) -> Result<(), E>,
    {
        let mut frame = match self.gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => {
                return Ok(match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => AppControl::Exit,
                    _ => AppControl::Continue,
                });
            }
        };

        let drawn = {
            let mut pass = frame.clear_pass(clear);
            let mut draw_ctx = WgpuDrawContext::new(&mut pass);
            draw(&mut draw_ctx)
        };

        self.window.window.pre_present_notify();
        self.gpu.submit(frame);

        drawn.map(|()| AppControl::Continue)
    }
}
