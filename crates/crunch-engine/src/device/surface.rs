use winit::dpi::PhysicalSize;

/// What the frame loop should do after failing to acquire a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; try again next frame.
    Reconfigured,
    SkipFrame,
    /// Unrecoverable; shut down.
    Fatal,
}

pub(crate) fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    let srgb = [
        wgpu::TextureFormat::Bgra8UnormSrgb,
        wgpu::TextureFormat::Rgba8UnormSrgb,
    ];

    prefer_srgb
        .then(|| srgb.into_iter().find(|f| formats.contains(f)))
        .flatten()
        .or_else(|| formats.first().copied())
}

pub(crate) fn choose_alpha_mode(
    supported: &[wgpu::CompositeAlphaMode],
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| supported.contains(m))
        .or_else(|| supported.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Maps an acquire failure to an action; `Lost`/`Outdated` need a reconfigure
/// unless the window is minimized.
pub(crate) fn classify_surface_error(
    err: &wgpu::SurfaceError,
    size: PhysicalSize<u32>,
) -> (SurfaceErrorAction, bool) {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
            let reconfigure = size.width > 0 && size.height > 0;
            (SurfaceErrorAction::Reconfigured, reconfigure)
        }
        wgpu::SurfaceError::OutOfMemory => (SurfaceErrorAction::Fatal, false),
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => {
            (SurfaceErrorAction::SkipFrame, false)
        }
    }
}
