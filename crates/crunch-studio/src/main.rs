use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use crunch_engine::backend::WgpuDevice;
use crunch_engine::core::{App, AppControl, FrameCtx};
use crunch_engine::device::GpuInit;
use crunch_engine::logging::{init_logging, LoggingConfig};
use crunch_engine::window::{Runtime, RuntimeConfig};
use crunch_engine::{Primitive, Vertex};

const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.04,
    a: 1.0,
};

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let texture = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| asset_dir().join("assets/checker.png"));
    log::info!("texture: {}", texture.display());

    let config = RuntimeConfig {
        title: "crunch studio".to_string(),
        ..RuntimeConfig::default()
    };

    Runtime::run(config, GpuInit::default(), Studio::new(texture))
}

fn asset_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// One textured quad, built on the first frame.
struct Studio {
    texture: PathBuf,
    quad: Option<Primitive<WgpuDevice>>,
}

impl Studio {
    fn new(texture: PathBuf) -> Self {
        Self {
            texture,
            quad: None,
        }
    }

    fn build_quad(&self, device: &Rc<WgpuDevice>) -> Result<Primitive<WgpuDevice>> {
        let white = [1.0, 1.0, 1.0, 1.0];
        let vertices = [
            Vertex::new([-0.5, -0.5, 0.0, 1.0], white, [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0, 1.0], [1.0, 0.6, 0.6, 1.0], [1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0, 1.0], white, [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0, 1.0], [0.6, 0.6, 1.0, 1.0], [0.0, 0.0]),
        ];
        let indices: [u32; 6] = [0, 1, 2, 0, 2, 3];

        let shaders = asset_dir().join("shaders");
        let vs = shaders.join("textured_vs");
        let ps = shaders.join("textured_ps");

        let mut quad = Primitive::with_label(device, "studio quad");
        quad.init(&vertices, &indices, &self.texture)
            .with_context(|| format!("failed to initialize quad with {}", self.texture.display()))?;
        quad.set_vertex_shader(&vs.to_string_lossy())
            .context("failed to set vertex shader")?;
        quad.set_pixel_shader(&ps.to_string_lossy())
            .context("failed to set pixel shader")?;
        Ok(quad)
    }
}

impl App for Studio {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => AppControl::Exit,
            _ => AppControl::Continue,
        }
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.quad.is_none() {
            match self.build_quad(ctx.gpu.resources()) {
                Ok(quad) => self.quad = Some(quad),
                Err(err) => {
                    log::error!("{err:#}");
                    return AppControl::Exit;
                }
            }
        }
        let Some(quad) = self.quad.as_ref() else {
            return AppControl::Exit;
        };

        match ctx.render(CLEAR, |draw| quad.render(draw)) {
            Ok(control) => control,
            Err(err) => {
                log::error!("render failed: {err}");
                AppControl::Exit
            }
        }
    }

    fn on_exit(&mut self, _window_id: WindowId) {
        if let Some(mut quad) = self.quad.take() {
            quad.shutdown();
        }
    }
}
