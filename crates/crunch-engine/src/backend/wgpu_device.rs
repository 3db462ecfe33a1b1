use std::borrow::Cow;

use wgpu::util::DeviceExt;

use super::{
    BufferBinding, BufferDesc, BufferUsage, DeviceError, DrawContext, GpuDevice, IndexFormat,
    PipelineDesc, Topology, VertexElement, VertexFormat,
};
use crate::shader::{ShaderCode, ShaderProgram, ShaderStage};
use crate::texture::TextureImage;

/// `wgpu` implementation of [`GpuDevice`].
///
/// Holds clones of the device/queue handles; the window-bound [`crate::device::Gpu`]
/// stays responsible for creating and tearing them down.
///
/// Cheap rejections (zero-sized or oversized buffers, invalid shader code,
/// vertex inputs missing from an input layout) are checked up front. Every
/// creation call additionally runs inside validation and out-of-memory error
/// scopes, so anything `wgpu` still rejects comes back as a [`DeviceError`]
/// instead of reaching the uncaptured-error handler.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,

    /// Layout of a texture bind group: view at binding 0, sampler at binding 1.
    texture_layout: wgpu::BindGroupLayout,
}

/// Compiled shader module plus the entry point the pipeline will use.
pub struct WgpuShader {
    module: wgpu::ShaderModule,
    stage: ShaderStage,
    entry_point: String,
    /// `@location`s the entry point reads.
    input_locations: Vec<u32>,
}

/// Vertex attributes of one interleaved vertex buffer.
pub struct WgpuInputLayout {
    attributes: Vec<wgpu::VertexAttribute>,
    stride: u64,
}

/// Texture, view, sampler and the bind group tying them together.
pub struct WgpuTexture {
    _texture: wgpu::Texture,
    _view: wgpu::TextureView,
    _sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
}

impl WgpuDevice {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, color_format: wgpu::TextureFormat) -> Self {
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("crunch texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            color_format,
            texture_layout,
        }
    }

    /// Runs `create` inside validation and out-of-memory error scopes.
    ///
    /// A captured error is returned as [`DeviceError::Rejected`] and the
    /// (invalid) object is dropped.
    fn scoped<T>(&self, what: &str, create: impl FnOnce() -> T) -> Result<T, DeviceError> {
        let out_of_memory = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = create();

        // Scopes pop innermost first.
        let validation = pollster::block_on(validation.pop());
        let out_of_memory = pollster::block_on(out_of_memory.pop());

        match validation.or(out_of_memory) {
            Some(err) => {
                log::warn!("wgpu rejected {what}: {err}");
                Err(DeviceError::Rejected(format!("{what}: {err}")))
            }
            None => Ok(value),
        }
    }
}

impl GpuDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;
    type Shader = WgpuShader;
    type InputLayout = WgpuInputLayout;
    type Pipeline = wgpu::RenderPipeline;
    type Texture = WgpuTexture;

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<wgpu::Buffer, DeviceError> {
        let size = desc.contents.len() as u64;
        if size == 0 {
            return Err(DeviceError::InvalidDescriptor("zero-sized buffer".to_string()));
        }
        let max = self.device.limits().max_buffer_size;
        if size > max {
            return Err(DeviceError::InvalidDescriptor(format!(
                "buffer of {size} bytes exceeds the device limit of {max}"
            )));
        }

        let mut usage = match desc.binding {
            BufferBinding::Vertex => wgpu::BufferUsages::VERTEX,
            BufferBinding::Index => wgpu::BufferUsages::INDEX,
        };
        if desc.usage == BufferUsage::Default {
            usage |= wgpu::BufferUsages::COPY_DST;
        }

        self.scoped("buffer", || {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label,
                contents: desc.contents,
                usage,
            })
        })
    }

    fn create_shader(
        &self,
        program: &ShaderProgram,
        label: Option<&str>,
    ) -> Result<WgpuShader, DeviceError> {
        let module = parse_program(program)?;
        let input_locations = entry_point_inputs(&module, program)?;

        let source = match &program.code {
            ShaderCode::Binary(words) => wgpu::ShaderSource::SpirV(Cow::Borrowed(words.as_slice())),
            ShaderCode::Source(text) => wgpu::ShaderSource::Wgsl(Cow::Borrowed(text.as_str())),
        };

        let module = self
            .scoped("shader module", || {
                self.device
                    .create_shader_module(wgpu::ShaderModuleDescriptor { label, source })
            })
            .map_err(|err| match err {
                // Non-strict sources skip naga validation; wgpu's is the compile error.
                DeviceError::Rejected(message) if program.is_source() => {
                    DeviceError::Compilation(message)
                }
                other => other,
            })?;

        Ok(WgpuShader {
            module,
            stage: program.stage,
            entry_point: program.entry_point.clone(),
            input_locations,
        })
    }

    fn create_input_layout(
        &self,
        elements: &[VertexElement],
        stride: u64,
        vertex_shader: &WgpuShader,
    ) -> Result<WgpuInputLayout, DeviceError> {
        if vertex_shader.stage != ShaderStage::Vertex {
            return Err(DeviceError::InvalidDescriptor(
                "input layout needs a vertex shader".to_string(),
            ));
        }

        let max_attributes = self.device.limits().max_vertex_attributes as usize;
        if elements.len() > max_attributes {
            return Err(DeviceError::InvalidDescriptor(format!(
                "{} vertex elements exceed the device limit of {max_attributes}",
                elements.len()
            )));
        }

        let mut attributes = Vec::with_capacity(elements.len());
        for e in elements {
            if e.offset + e.format.size() > stride {
                return Err(DeviceError::InvalidDescriptor(format!(
                    "element {} ends past stride {stride}",
                    e.semantic
                )));
            }
            attributes.push(wgpu::VertexAttribute {
                format: map_vertex_format(e.format),
                offset: e.offset,
                shader_location: e.location,
            });
        }

        if let Some(location) = vertex_shader
            .input_locations
            .iter()
            .find(|l| !elements.iter().any(|e| e.location == **l))
        {
            return Err(DeviceError::InvalidDescriptor(format!(
                "vertex shader reads @location({location}), which the input layout does not provide"
            )));
        }

        Ok(WgpuInputLayout { attributes, stride })
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDesc<'_, Self>,
    ) -> Result<wgpu::RenderPipeline, DeviceError> {
        if desc.vertex_shader.stage != ShaderStage::Vertex
            || desc.pixel_shader.stage != ShaderStage::Fragment
        {
            return Err(DeviceError::InvalidDescriptor(
                "pipeline stages do not match their shaders".to_string(),
            ));
        }

        let layout = self.scoped("pipeline layout", || {
            self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: desc.label,
                bind_group_layouts: &[&self.texture_layout],
                immediate_size: 0,
            })
        })?;

        let buffers = [wgpu::VertexBufferLayout {
            array_stride: desc.input_layout.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &desc.input_layout.attributes,
        }];

        self.scoped("render pipeline", || {
            self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label,
                layout: Some(&layout),

                vertex: wgpu::VertexState {
                    module: &desc.vertex_shader.module,
                    entry_point: Some(desc.vertex_shader.entry_point.as_str()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },

                fragment: Some(wgpu::FragmentState {
                    module: &desc.pixel_shader.module,
                    entry_point: Some(desc.pixel_shader.entry_point.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),

                primitive: wgpu::PrimitiveState {
                    topology: map_topology(desc.topology),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },

                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }

    fn create_texture(
        &self,
        image: &TextureImage,
        label: Option<&str>,
    ) -> Result<WgpuTexture, DeviceError> {
        let (width, height) = (image.width(), image.height());
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(DeviceError::InvalidDescriptor(format!(
                "texture of {width}x{height} is outside 1..={max}"
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        self.scoped("texture", || {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label,
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.pixels(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                size,
            );

            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
                label,
                address_mode_u: wgpu::AddressMode::Repeat,
                address_mode_v: wgpu::AddressMode::Repeat,
                address_mode_w: wgpu::AddressMode::Repeat,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::MipmapFilterMode::Nearest,
                ..Default::default()
            });

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label,
                layout: &self.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });

            WgpuTexture {
                _texture: texture,
                _view: view,
                _sampler: sampler,
                bind_group,
            }
        })
    }
}

/// Draw context over an open render pass.
pub struct WgpuDrawContext<'p, 'e> {
    pass: &'p mut wgpu::RenderPass<'e>,
}

impl<'p, 'e> WgpuDrawContext<'p, 'e> {
    pub fn new(pass: &'p mut wgpu::RenderPass<'e>) -> Self {
        Self { pass }
    }
}

impl DrawContext<WgpuDevice> for WgpuDrawContext<'_, '_> {
    fn bind_texture(&mut self, slot: u32, texture: &WgpuTexture) {
        self.pass.set_bind_group(slot, &texture.bind_group, &[]);
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: &wgpu::Buffer, _stride: u64, offset: u64) {
        // Stride is part of the pipeline's vertex layout.
        self.pass.set_vertex_buffer(slot, buffer.slice(offset..));
    }

    fn bind_index_buffer(&mut self, buffer: &wgpu::Buffer, format: IndexFormat, offset: u64) {
        self.pass
            .set_index_buffer(buffer.slice(offset..), map_index_format(format));
    }

    fn set_pipeline(&mut self, pipeline: &wgpu::RenderPipeline) {
        self.pass.set_pipeline(pipeline);
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.pass
            .draw_indexed(start_index..start_index + index_count, base_vertex, 0..1);
    }
}

/// Parses (and, in strict mode, validates) the program.
fn parse_program(program: &ShaderProgram) -> Result<naga::Module, DeviceError> {
    match &program.code {
        ShaderCode::Source(text) => {
            let module = naga::front::wgsl::parse_str(text)
                .map_err(|e| DeviceError::Compilation(e.emit_to_string(text)))?;

            if program.strict {
                naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::default(),
                )
                .validate(&module)
                .map_err(|e| DeviceError::Compilation(e.to_string()))?;
            }
            Ok(module)
        }
        ShaderCode::Binary(words) => {
            naga::front::spv::parse_u8_slice(bytemuck::cast_slice(words.as_slice()), &Default::default())
                .map_err(|e| DeviceError::InvalidDescriptor(format!("invalid SPIR-V: {e}")))
        }
    }
}

/// Finds the program's entry point for its stage and returns the
/// `@location`s it reads, sorted.
fn entry_point_inputs(module: &naga::Module, program: &ShaderProgram) -> Result<Vec<u32>, DeviceError> {
    let stage = match program.stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    let Some(entry_point) = module
        .entry_points
        .iter()
        .find(|ep| ep.name == program.entry_point && ep.stage == stage)
    else {
        let message = format!(
            "{} has no {} entry point `{}`",
            program.origin.display(),
            program.stage.name(),
            program.entry_point
        );
        return Err(if program.is_source() {
            DeviceError::Compilation(message)
        } else {
            DeviceError::InvalidDescriptor(message)
        });
    };

    let location = |binding: &Option<naga::Binding>| match binding {
        Some(naga::Binding::Location { location, .. }) => Some(*location),
        _ => None,
    };

    let mut locations = Vec::new();
    for arg in &entry_point.function.arguments {
        if let Some(l) = location(&arg.binding) {
            locations.push(l);
        } else if let naga::TypeInner::Struct { members, .. } = &module.types[arg.ty].inner {
            locations.extend(members.iter().filter_map(|m| location(&m.binding)));
        }
    }
    locations.sort_unstable();
    Ok(locations)
}

fn map_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
    }
}

fn map_index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

fn map_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
    }
}
