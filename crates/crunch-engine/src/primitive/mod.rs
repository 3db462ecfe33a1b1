//! Renderable primitive: one mesh with its buffers, shaders, texture and model
//! transform.
//!
//! Call order is enforced through [`PrimitiveStage`]:
//! `new → init → set_vertex_shader → set_pixel_shader → render*`. An operation
//! called in the wrong stage returns [`PrimitiveError::InvalidState`] and leaves
//! the primitive untouched.
//!
//! Resources created by a failing call are released before the call returns;
//! resources from earlier successful calls stay until `shutdown` or drop.

mod error;
mod stage;
mod vertex;

use std::path::Path;
use std::rc::{Rc, Weak};

use glam::Vec3;

use crate::backend::{
    BufferBinding, BufferDesc, BufferUsage, DrawContext, GpuDevice, IndexFormat, PipelineDesc,
    Topology,
};
use crate::shader::{ShaderConfig, ShaderError, ShaderProgram, ShaderResolver, ShaderStage};
use crate::texture::Texture;
use crate::transform::ModelTransform;

pub use error::{PrimitiveError, ResourceKind};
pub use stage::PrimitiveStage;
pub use vertex::Vertex;

/// Texture slot the primitive's texture is bound to.
pub const TEXTURE_SLOT: u32 = 0;

/// Vertex buffer slot the primitive's vertices are bound to.
pub const VERTEX_SLOT: u32 = 0;

struct Geometry<D: GpuDevice> {
    vertex_buffer: D::Buffer,
    index_buffer: D::Buffer,
    index_count: u32,
}

struct VertexStage<D: GpuDevice> {
    shader: D::Shader,
    input_layout: D::InputLayout,
}

struct PixelStage<D: GpuDevice> {
    _shader: D::Shader,
    pipeline: D::Pipeline,
}

/// One drawable mesh.
///
/// The device is held as a weak back reference: the primitive creates objects
/// through it but never keeps it alive or tears it down.
pub struct Primitive<D: GpuDevice> {
    device: Weak<D>,
    label: String,
    resolver: ShaderResolver,

    geometry: Option<Geometry<D>>,
    vertex_stage: Option<VertexStage<D>>,
    pixel_stage: Option<PixelStage<D>>,
    texture: Texture<D>,

    transform: ModelTransform,
    released: bool,
}

impl<D: GpuDevice> Primitive<D> {
    pub fn new(device: &Rc<D>) -> Self {
        Self::with_label(device, "primitive")
    }

    /// Creates a primitive whose GPU objects are labelled after `label`.
    pub fn with_label(device: &Rc<D>, label: impl Into<String>) -> Self {
        Self {
            device: Rc::downgrade(device),
            label: label.into(),
            resolver: ShaderResolver::default(),
            geometry: None,
            vertex_stage: None,
            pixel_stage: None,
            texture: Texture::default(),
            transform: ModelTransform::identity(),
            released: false,
        }
    }

    /// Replaces the shader lookup options used by the `set_*_shader` calls.
    pub fn with_shader_config(mut self, config: ShaderConfig) -> Self {
        self.resolver = ShaderResolver::new(config);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stage(&self) -> PrimitiveStage {
        if self.released {
            PrimitiveStage::Released
        } else if self.pixel_stage.is_some() {
            PrimitiveStage::Ready
        } else if self.vertex_stage.is_some() {
            PrimitiveStage::ShadersBound
        } else if self.geometry.is_some() {
            PrimitiveStage::Initialized
        } else {
            PrimitiveStage::Uninitialized
        }
    }

    /// Number of indices drawn per `render`, once initialized.
    pub fn index_count(&self) -> Option<u32> {
        self.geometry.as_ref().map(|g| g.index_count)
    }

    pub fn texture(&self) -> &Texture<D> {
        &self.texture
    }

    pub fn transform(&self) -> &ModelTransform {
        &self.transform
    }

    /// Overwrites the translation of the model transform.
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.set_position(position);
    }

    /// Uploads geometry and loads the texture.
    ///
    /// The vertex buffer is immutable; the index buffer uses default usage.
    /// Every index must address one of `vertices`.
    pub fn init(
        &mut self,
        vertices: &[Vertex],
        indices: &[u32],
        texture_path: impl AsRef<Path>,
    ) -> Result<(), PrimitiveError> {
        self.expect_stage("init", PrimitiveStage::Uninitialized)?;
        let index_count = validate_geometry(vertices, indices)?;
        let device = self.device()?;

        let vertex_label = format!("{} vertex buffer", self.label);
        let vertex_buffer = device
            .create_buffer(&BufferDesc {
                label: Some(&vertex_label),
                usage: BufferUsage::Immutable,
                binding: BufferBinding::Vertex,
                contents: bytemuck::cast_slice(vertices),
            })
            .map_err(|source| PrimitiveError::ResourceCreation {
                resource: ResourceKind::VertexBuffer,
                source,
            })?;

        let index_label = format!("{} index buffer", self.label);
        let index_buffer = device
            .create_buffer(&BufferDesc {
                label: Some(&index_label),
                usage: BufferUsage::Default,
                binding: BufferBinding::Index,
                contents: bytemuck::cast_slice(indices),
            })
            .map_err(|source| PrimitiveError::ResourceCreation {
                resource: ResourceKind::IndexBuffer,
                source,
            })?;

        let mut texture = Texture::default();
        texture.init(device.as_ref(), texture_path)?;

        self.geometry = Some(Geometry {
            vertex_buffer,
            index_buffer,
            index_count,
        });
        self.texture = texture;

        log::info!(
            "{}: initialized with {} vertices, {index_count} indices",
            self.label,
            vertices.len()
        );
        Ok(())
    }

    /// Resolves and creates the vertex shader, then the input layout for [`Vertex`].
    pub fn set_vertex_shader(&mut self, identifier: &str) -> Result<(), PrimitiveError> {
        self.expect_stage("set_vertex_shader", PrimitiveStage::Initialized)?;
        let device = self.device()?;

        let program = self.resolver.resolve(identifier, ShaderStage::Vertex)?;
        let label = format!("{} vertex shader", self.label);
        let shader = create_shader(device.as_ref(), &program, &label, ResourceKind::VertexShader)?;

        let input_layout = device
            .create_input_layout(&Vertex::ELEMENTS, Vertex::STRIDE, &shader)
            .map_err(|source| PrimitiveError::ResourceCreation {
                resource: ResourceKind::InputLayout,
                source,
            })?;

        self.vertex_stage = Some(VertexStage {
            shader,
            input_layout,
        });

        log::debug!("{}: vertex shader set from {}", self.label, program.origin.display());
        Ok(())
    }

    /// Resolves and creates the pixel shader, then links the pipeline.
    pub fn set_pixel_shader(&mut self, identifier: &str) -> Result<(), PrimitiveError> {
        self.expect_stage("set_pixel_shader", PrimitiveStage::ShadersBound)?;
        let device = self.device()?;
        let Some(vertex_stage) = self.vertex_stage.as_ref() else {
            return Err(self.invalid_state("set_pixel_shader"));
        };

        let program = self.resolver.resolve(identifier, ShaderStage::Fragment)?;
        let label = format!("{} pixel shader", self.label);
        let shader = create_shader(device.as_ref(), &program, &label, ResourceKind::PixelShader)?;

        let pipeline_label = format!("{} pipeline", self.label);
        let pipeline = device
            .create_pipeline(&PipelineDesc {
                label: Some(&pipeline_label),
                vertex_shader: &vertex_stage.shader,
                pixel_shader: &shader,
                input_layout: &vertex_stage.input_layout,
                topology: Topology::TriangleList,
            })
            .map_err(|source| PrimitiveError::ResourceCreation {
                resource: ResourceKind::Pipeline,
                source,
            })?;

        self.pixel_stage = Some(PixelStage {
            _shader: shader,
            pipeline,
        });

        log::info!("{}: ready to render", self.label);
        Ok(())
    }

    /// Records the bindings and one indexed draw into `ctx`.
    ///
    /// Order: texture, vertex buffer, index buffer, pipeline, draw.
    pub fn render<C>(&self, ctx: &mut C) -> Result<(), PrimitiveError>
    where
        C: DrawContext<D> + ?Sized,
    {
        let (Some(geometry), Some(pixel_stage)) = (&self.geometry, &self.pixel_stage) else {
            return Err(self.invalid_state("render"));
        };

        self.texture.bind(ctx, TEXTURE_SLOT);
        ctx.bind_vertex_buffer(VERTEX_SLOT, &geometry.vertex_buffer, Vertex::STRIDE, 0);
        ctx.bind_index_buffer(&geometry.index_buffer, IndexFormat::Uint32, 0);
        ctx.set_pipeline(&pixel_stage.pipeline);
        ctx.draw_indexed(geometry.index_count, 0, 0);
        Ok(())
    }

    /// Releases every GPU object the primitive owns. The device is left alone.
    ///
    /// Safe to call more than once; `Drop` calls it too.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }

        // Dependents first: the pipeline references both shaders and the layout.
        self.pixel_stage = None;
        self.vertex_stage = None;
        self.geometry = None;
        self.texture.release();
        self.released = true;

        log::debug!("{}: shut down", self.label);
    }

    fn device(&self) -> Result<Rc<D>, PrimitiveError> {
        self.device.upgrade().ok_or(PrimitiveError::DeviceLost)
    }

    fn expect_stage(
        &self,
        operation: &'static str,
        expected: PrimitiveStage,
    ) -> Result<(), PrimitiveError> {
        if self.stage() == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> PrimitiveError {
        PrimitiveError::InvalidState {
            operation,
            stage: self.stage(),
        }
    }
}

impl<D: GpuDevice> Drop for Primitive<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate_geometry(vertices: &[Vertex], indices: &[u32]) -> Result<u32, PrimitiveError> {
    if vertices.is_empty() {
        return Err(PrimitiveError::InvalidGeometry("no vertices".to_string()));
    }
    if indices.is_empty() {
        return Err(PrimitiveError::InvalidGeometry("no indices".to_string()));
    }

    let index_count = u32::try_from(indices.len()).map_err(|_| {
        PrimitiveError::InvalidGeometry(format!("{} indices exceed u32::MAX", indices.len()))
    })?;

    if let Some((at, index)) = indices
        .iter()
        .enumerate()
        .find(|(_, i)| **i as usize >= vertices.len())
    {
        return Err(PrimitiveError::InvalidGeometry(format!(
            "index {index} at position {at} is out of range for {} vertices",
            vertices.len()
        )));
    }

    Ok(index_count)
}

/// Creates a shader object, reporting compile failures of source programs as
/// shader resolution errors.
fn create_shader<D: GpuDevice>(
    device: &D,
    program: &ShaderProgram,
    label: &str,
    resource: ResourceKind,
) -> Result<D::Shader, PrimitiveError> {
    device
        .create_shader(program, Some(label))
        .map_err(|source| match source {
            crate::backend::DeviceError::Compilation(message) if program.is_source() => {
                ShaderError::Compilation {
                    path: program.origin.clone(),
                    message,
                }
                .into()
            }
            source => PrimitiveError::ResourceCreation { resource, source },
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::{DeviceOp, RecordedKind};
    use crate::backend::{Command, RecordingContext, RecordingDevice};
    use crate::texture::TextureError;
    use glam::{Mat4, Quat};
    use std::path::PathBuf;

    const VS_SOURCE: &str = "@vertex fn main() {}";
    const PS_SOURCE: &str = "@fragment fn main() {}";

    struct Fixture {
        dir: PathBuf,
        texture: PathBuf,
    }

    impl Fixture {
        fn new(name: &str) -> Self {
            let _ = env_logger::builder().is_test(true).try_init();

            let dir = std::env::temp_dir().join(format!("crunch-primitive-{name}-{}", std::process::id()));
            std::fs::create_dir_all(&dir).expect("create fixture dir");

            let texture = dir.join("checker.png");
            image::RgbaImage::from_fn(2, 2, |x, y| {
                if (x + y) % 2 == 0 {
                    image::Rgba([255, 255, 255, 255])
                } else {
                    image::Rgba([0, 0, 0, 255])
                }
            })
            .save(&texture)
            .expect("write fixture texture");

            std::fs::write(dir.join("quad_vs.wgsl"), VS_SOURCE).expect("write vs");
            std::fs::write(dir.join("quad_ps.wgsl"), PS_SOURCE).expect("write ps");

            Self { dir, texture }
        }

        fn shader(&self, name: &str) -> String {
            self.dir.join(name).display().to_string()
        }
    }

    fn quad() -> (Vec<Vertex>, Vec<u32>) {
        let white = [1.0, 1.0, 1.0, 1.0];
        let vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0, 1.0], white, [0.0, 1.0]),
            Vertex::new([0.5, -0.5, 0.0, 1.0], white, [1.0, 1.0]),
            Vertex::new([0.5, 0.5, 0.0, 1.0], white, [1.0, 0.0]),
            Vertex::new([-0.5, 0.5, 0.0, 1.0], white, [0.0, 0.0]),
        ];
        (vertices, vec![0, 1, 2, 0, 2, 3])
    }

    fn ready_primitive(device: &Rc<RecordingDevice>, fx: &Fixture) -> Primitive<RecordingDevice> {
        let (vertices, indices) = quad();
        let mut p = Primitive::with_label(device, "quad");
        p.init(&vertices, &indices, &fx.texture).unwrap();
        p.set_vertex_shader(&fx.shader("quad_vs")).unwrap();
        p.set_pixel_shader(&fx.shader("quad_ps")).unwrap();
        p
    }

    // ── init ──────────────────────────────────────────────────────────────

    #[test]
    fn init_records_index_count_and_uploads_exact_contents() {
        let fx = Fixture::new("init");
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        assert_eq!(p.stage(), PrimitiveStage::Uninitialized);
        p.init(&vertices, &indices, &fx.texture).unwrap();

        assert_eq!(p.stage(), PrimitiveStage::Initialized);
        assert_eq!(p.index_count(), Some(6));
        assert!(p.texture().is_loaded());

        let geometry = p.geometry.as_ref().unwrap();
        assert_eq!(geometry.vertex_buffer.usage, BufferUsage::Immutable);
        assert_eq!(geometry.vertex_buffer.binding, BufferBinding::Vertex);
        assert_eq!(
            geometry.vertex_buffer.contents.as_slice(),
            bytemuck::cast_slice::<Vertex, u8>(&vertices)
        );
        assert_eq!(geometry.vertex_buffer.contents.len(), 4 * 40);

        assert_eq!(geometry.index_buffer.usage, BufferUsage::Default);
        assert_eq!(geometry.index_buffer.binding, BufferBinding::Index);
        assert_eq!(geometry.index_buffer.contents.len(), 6 * 4);
    }

    #[test]
    fn init_twice_is_rejected() {
        let fx = Fixture::new("init-twice");
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        let created = device.created_count();

        let err = p.init(&vertices, &indices, &fx.texture).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::InvalidState { operation: "init", stage: PrimitiveStage::Initialized }
        ));
        assert_eq!(device.created_count(), created);
    }

    #[test]
    fn init_rejects_bad_geometry() {
        let fx = Fixture::new("bad-geometry");
        let device = Rc::new(RecordingDevice::new());
        let (vertices, _) = quad();
        let mut p = Primitive::new(&device);

        for indices in [Vec::<u32>::new(), vec![0, 1, 4]] {
            let err = p.init(&vertices, &indices, &fx.texture).unwrap_err();
            assert!(matches!(err, PrimitiveError::InvalidGeometry(_)), "{err}");
        }
        assert!(matches!(
            p.init(&[], &[0], &fx.texture),
            Err(PrimitiveError::InvalidGeometry(_))
        ));

        assert_eq!(device.created_count(), 0);
        assert_eq!(p.stage(), PrimitiveStage::Uninitialized);
    }

    #[test]
    fn rejected_vertex_buffer_fails_init() {
        let fx = Fixture::new("reject-vb");
        let device = Rc::new(RecordingDevice::new());
        device.reject(DeviceOp::ImmutableBuffer);
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        let err = p.init(&vertices, &indices, &fx.texture).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ResourceCreation { resource: ResourceKind::VertexBuffer, .. }
        ));
        assert_eq!(p.stage(), PrimitiveStage::Uninitialized);

        drop(p);
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn rejected_index_buffer_rolls_back_vertex_buffer() {
        let fx = Fixture::new("reject-ib");
        let device = Rc::new(RecordingDevice::new());
        device.reject(DeviceOp::DefaultBuffer);
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        let err = p.init(&vertices, &indices, &fx.texture).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ResourceCreation { resource: ResourceKind::IndexBuffer, .. }
        ));

        assert_eq!(device.created_count(), 1);
        assert_eq!(device.live_count(), 0);
        assert_eq!(p.stage(), PrimitiveStage::Uninitialized);

        // The failed call left no trace, so a retry is a first init.
        device.accept(DeviceOp::DefaultBuffer);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        assert_eq!(p.stage(), PrimitiveStage::Initialized);
    }

    #[test]
    fn texture_failure_rolls_back_both_buffers() {
        let fx = Fixture::new("reject-texture");
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        let err = p
            .init(&vertices, &indices, fx.dir.join("missing.png"))
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::Texture(_)));
        assert_eq!(device.created_of_kind(RecordedKind::Buffer), 2);
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn rejected_texture_rolls_back_both_buffers() {
        let fx = Fixture::new("reject-texture-object");
        let device = Rc::new(RecordingDevice::new());
        device.reject(DeviceOp::Texture);
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        let err = p.init(&vertices, &indices, &fx.texture).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::Texture(TextureError::Creation { .. })
        ));
        assert_eq!(device.created_of_kind(RecordedKind::Buffer), 2);
        assert_eq!(device.live_count(), 0);
        assert_eq!(p.stage(), PrimitiveStage::Uninitialized);
        assert!(!p.texture().is_loaded());
    }

    // ── shaders ───────────────────────────────────────────────────────────

    #[test]
    fn shaders_advance_the_stage() {
        let fx = Fixture::new("shaders");
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        p.set_vertex_shader(&fx.shader("quad_vs")).unwrap();
        assert_eq!(p.stage(), PrimitiveStage::ShadersBound);
        p.set_pixel_shader(&fx.shader("quad_ps")).unwrap();
        assert_eq!(p.stage(), PrimitiveStage::Ready);

        assert_eq!(device.created_of_kind(RecordedKind::Shader), 2);
        assert_eq!(device.created_of_kind(RecordedKind::InputLayout), 1);
        assert_eq!(device.created_of_kind(RecordedKind::Pipeline), 1);

        let layout = &p.vertex_stage.as_ref().unwrap().input_layout;
        assert_eq!(layout.elements, Vertex::ELEMENTS.to_vec());
        assert_eq!(layout.stride, Vertex::STRIDE);
        assert_eq!(
            p.pixel_stage.as_ref().unwrap().pipeline.topology,
            Topology::TriangleList
        );
    }

    #[test]
    fn shaders_out_of_order_are_rejected() {
        let fx = Fixture::new("order");
        let device = Rc::new(RecordingDevice::new());

        let mut p = Primitive::new(&device);
        assert!(matches!(
            p.set_vertex_shader(&fx.shader("quad_vs")),
            Err(PrimitiveError::InvalidState { stage: PrimitiveStage::Uninitialized, .. })
        ));

        let (vertices, indices) = quad();
        p.init(&vertices, &indices, &fx.texture).unwrap();
        assert!(matches!(
            p.set_pixel_shader(&fx.shader("quad_ps")),
            Err(PrimitiveError::InvalidState { stage: PrimitiveStage::Initialized, .. })
        ));
        assert_eq!(device.created_of_kind(RecordedKind::Shader), 0);
    }

    #[test]
    fn missing_shader_creates_nothing() {
        let fx = Fixture::new("missing-shader");
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();

        let err = p.set_vertex_shader(&fx.shader("nope")).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ShaderResolution(ShaderError::NotFound { .. })
        ));
        assert_eq!(device.created_of_kind(RecordedKind::Shader), 0);
        assert_eq!(p.stage(), PrimitiveStage::Initialized);

        p.set_vertex_shader(&fx.shader("quad_vs")).unwrap();
        let err = p.set_pixel_shader(&fx.shader("nope")).unwrap_err();
        assert!(matches!(err, PrimitiveError::ShaderResolution(_)));
        assert_eq!(device.created_of_kind(RecordedKind::Shader), 1);
        assert_eq!(p.stage(), PrimitiveStage::ShadersBound);
    }

    #[test]
    fn failed_compile_is_a_resolution_error() {
        let fx = Fixture::new("compile");
        std::fs::write(fx.dir.join("broken_vs.wgsl"), "@vertex fn vs_main() {}").unwrap();
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();

        let err = p.set_vertex_shader(&fx.shader("broken_vs")).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ShaderResolution(ShaderError::Compilation { .. })
        ));
        assert_eq!(device.created_of_kind(RecordedKind::Shader), 0);
    }

    #[test]
    fn rejected_input_layout_releases_vertex_shader() {
        let fx = Fixture::new("reject-layout");
        let device = Rc::new(RecordingDevice::new());
        device.reject(DeviceOp::InputLayout);
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        let live = device.live_count();

        let err = p.set_vertex_shader(&fx.shader("quad_vs")).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ResourceCreation { resource: ResourceKind::InputLayout, .. }
        ));
        assert_eq!(device.live_count(), live);
        assert_eq!(p.stage(), PrimitiveStage::Initialized);
    }

    #[test]
    fn rejected_pipeline_releases_pixel_shader() {
        let fx = Fixture::new("reject-pipeline");
        let device = Rc::new(RecordingDevice::new());
        device.reject(DeviceOp::Pipeline);
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        p.set_vertex_shader(&fx.shader("quad_vs")).unwrap();
        let live = device.live_count();

        let err = p.set_pixel_shader(&fx.shader("quad_ps")).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ResourceCreation { resource: ResourceKind::Pipeline, .. }
        ));
        assert_eq!(device.live_count(), live);
        assert_eq!(p.stage(), PrimitiveStage::ShadersBound);
    }

    #[test]
    fn rejected_vertex_shader_creates_nothing() {
        let fx = Fixture::new("reject-vs");
        let device = Rc::new(RecordingDevice::new());
        device.reject(DeviceOp::VertexShader);
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        let live = device.live_count();

        let err = p.set_vertex_shader(&fx.shader("quad_vs")).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ResourceCreation { resource: ResourceKind::VertexShader, .. }
        ));
        assert_eq!(device.live_count(), live);
        assert_eq!(device.created_of_kind(RecordedKind::InputLayout), 0);
        assert_eq!(p.stage(), PrimitiveStage::Initialized);
    }

    #[test]
    fn rejected_pixel_shader_keeps_vertex_stage() {
        let fx = Fixture::new("reject-ps");
        let device = Rc::new(RecordingDevice::new());
        device.reject(DeviceOp::PixelShader);
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        p.set_vertex_shader(&fx.shader("quad_vs")).unwrap();
        let live = device.live_count();

        let err = p.set_pixel_shader(&fx.shader("quad_ps")).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::ResourceCreation { resource: ResourceKind::PixelShader, .. }
        ));
        assert_eq!(device.live_count(), live);
        assert_eq!(device.created_of_kind(RecordedKind::Pipeline), 0);
        assert_eq!(p.stage(), PrimitiveStage::ShadersBound);
    }

    #[test]
    fn precompiled_binary_wins_over_source() {
        let fx = Fixture::new("prefer-binary");
        let words: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];
        std::fs::write(fx.dir.join("quad_vs.spv"), bytemuck::cast_slice::<u32, u8>(&words))
            .unwrap();
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();

        let mut p = Primitive::new(&device);
        p.init(&vertices, &indices, &fx.texture).unwrap();
        p.set_vertex_shader(&fx.shader("quad_vs")).unwrap();

        let shader = &p.vertex_stage.as_ref().unwrap().shader;
        assert!(!shader.compiled_from_source);
        assert_eq!(shader.stage, ShaderStage::Vertex);
        assert_eq!(p.stage(), PrimitiveStage::ShadersBound);

        // The pixel stage has no binary and still compiles from source.
        p.set_pixel_shader(&fx.shader("quad_ps")).unwrap();
        assert_eq!(p.stage(), PrimitiveStage::Ready);
    }

    // ── render ────────────────────────────────────────────────────────────

    #[test]
    fn render_binds_everything_then_draws_once() {
        let fx = Fixture::new("render");
        let device = Rc::new(RecordingDevice::new());
        let p = ready_primitive(&device, &fx);

        let mut ctx = RecordingContext::default();
        p.render(&mut ctx).unwrap();

        let geometry = p.geometry.as_ref().unwrap();
        let texture = p.texture().handle().unwrap().id();
        let pipeline = p.pixel_stage.as_ref().unwrap().pipeline.id();
        assert_eq!(
            ctx.commands(),
            &[
                Command::BindTexture { slot: 0, texture },
                Command::BindVertexBuffer {
                    slot: 0,
                    buffer: geometry.vertex_buffer.id(),
                    stride: 40,
                    offset: 0,
                },
                Command::BindIndexBuffer {
                    buffer: geometry.index_buffer.id(),
                    format: IndexFormat::Uint32,
                    offset: 0,
                },
                Command::SetPipeline { pipeline },
                Command::DrawIndexed { index_count: 6, start_index: 0, base_vertex: 0 },
            ]
        );
    }

    #[test]
    fn render_before_ready_records_nothing() {
        let fx = Fixture::new("render-early");
        let device = Rc::new(RecordingDevice::new());
        let (vertices, indices) = quad();
        let mut ctx = RecordingContext::default();

        let mut p = Primitive::new(&device);
        assert!(p.render(&mut ctx).is_err());
        p.init(&vertices, &indices, &fx.texture).unwrap();
        p.set_vertex_shader(&fx.shader("quad_vs")).unwrap();
        let err = p.render(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            PrimitiveError::InvalidState { operation: "render", stage: PrimitiveStage::ShadersBound }
        ));
        assert!(ctx.commands().is_empty());
    }

    #[test]
    fn two_primitives_each_bind_their_own_state() {
        let fx = Fixture::new("two");
        let device = Rc::new(RecordingDevice::new());
        let a = ready_primitive(&device, &fx);

        let mut b = Primitive::with_label(&device, "triangle");
        let (vertices, _) = quad();
        b.init(&vertices[..3], &[0, 1, 2], &fx.texture).unwrap();
        b.set_vertex_shader(&fx.shader("quad_vs")).unwrap();
        b.set_pixel_shader(&fx.shader("quad_ps")).unwrap();

        let mut ctx = RecordingContext::default();
        a.render(&mut ctx).unwrap();
        b.render(&mut ctx).unwrap();
        a.render(&mut ctx).unwrap();

        let pipelines: Vec<_> = ctx
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetPipeline { pipeline } => Some(*pipeline),
                _ => None,
            })
            .collect();
        let a_pipeline = a.pixel_stage.as_ref().unwrap().pipeline.id();
        let b_pipeline = b.pixel_stage.as_ref().unwrap().pipeline.id();
        assert_eq!(pipelines, vec![a_pipeline, b_pipeline, a_pipeline]);

        let counts: Vec<_> = ctx
            .draw_calls()
            .map(|c| match c {
                Command::DrawIndexed { index_count, .. } => *index_count,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(counts, vec![6, 3, 6]);
    }

    // ── shutdown ──────────────────────────────────────────────────────────

    #[test]
    fn shutdown_releases_everything_exactly_once() {
        let fx = Fixture::new("shutdown");
        let device = Rc::new(RecordingDevice::new());
        let mut p = ready_primitive(&device, &fx);

        // 2 buffers, texture, 2 shaders, input layout, pipeline.
        assert_eq!(device.created_count(), 7);
        assert_eq!(device.live_count(), 7);

        p.shutdown();
        assert_eq!(p.stage(), PrimitiveStage::Released);
        assert_eq!(device.live_count(), 0);
        assert_eq!(device.released_count(), 7);

        p.shutdown();
        drop(p);
        assert_eq!(device.released_count(), 7);
        assert_eq!(Rc::strong_count(&device), 1);
    }

    #[test]
    fn released_primitive_refuses_work() {
        let fx = Fixture::new("released");
        let device = Rc::new(RecordingDevice::new());
        let mut p = ready_primitive(&device, &fx);
        p.shutdown();

        let mut ctx = RecordingContext::default();
        assert!(matches!(
            p.render(&mut ctx),
            Err(PrimitiveError::InvalidState { stage: PrimitiveStage::Released, .. })
        ));
        let (vertices, indices) = quad();
        assert!(p.init(&vertices, &indices, &fx.texture).is_err());
        assert!(ctx.commands().is_empty());
    }

    #[test]
    fn dropped_device_is_reported() {
        let fx = Fixture::new("device-lost");
        let device = Rc::new(RecordingDevice::new());
        let mut p = Primitive::new(&device);
        drop(device);

        let (vertices, indices) = quad();
        assert!(matches!(
            p.init(&vertices, &indices, &fx.texture),
            Err(PrimitiveError::DeviceLost)
        ));
    }

    // ── transform ─────────────────────────────────────────────────────────

    #[test]
    fn set_position_moves_translation_only() {
        let device = Rc::new(RecordingDevice::new());
        let mut p = Primitive::new(&device);
        let rotation = Quat::from_rotation_z(1.0);
        p.transform = ModelTransform::from_matrix(Mat4::from_quat(rotation));

        p.set_position(Vec3::new(3.0, 2.0, 1.0));

        let (scale, r, translation) = p.transform().matrix().to_scale_rotation_translation();
        assert_eq!(translation, Vec3::new(3.0, 2.0, 1.0));
        assert!(r.abs_diff_eq(rotation, 1e-5));
        assert!(scale.abs_diff_eq(Vec3::ONE, 1e-5));
        assert_eq!(p.stage(), PrimitiveStage::Uninitialized);
        assert_eq!(device.created_count(), 0);
    }
}
