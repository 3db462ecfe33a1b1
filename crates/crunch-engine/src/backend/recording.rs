//! Headless backend that records resource traffic and draw commands.
//!
//! Every object handed out by [`RecordingDevice`] carries a [`ResourceId`] and
//! reports its release back to the device when dropped, so callers can check
//! that each resource was released exactly once. Any creation call can be made
//! to fail with [`RecordingDevice::reject`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::{
    BufferBinding, BufferDesc, BufferUsage, DeviceError, DrawContext, GpuDevice, IndexFormat,
    PipelineDesc, Topology, VertexElement,
};
use crate::shader::{ShaderCode, ShaderProgram, ShaderStage};
use crate::texture::TextureImage;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Creation calls that can be made to fail.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DeviceOp {
    ImmutableBuffer,
    DefaultBuffer,
    VertexShader,
    PixelShader,
    /// Compiling source code (binaries are unaffected).
    Compile,
    InputLayout,
    Pipeline,
    Texture,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordedKind {
    Buffer,
    Shader,
    InputLayout,
    Pipeline,
    Texture,
}

#[derive(Debug, Default)]
struct Ledger {
    next_id: u32,
    created: Vec<(ResourceId, RecordedKind)>,
    released: Vec<ResourceId>,
    rejected: HashSet<DeviceOp>,
}

impl Ledger {
    fn check(&self, op: DeviceOp) -> Result<(), DeviceError> {
        if self.rejected.contains(&op) {
            return Err(DeviceError::Rejected(format!("{op:?} rejected by test device")));
        }
        Ok(())
    }

    fn allocate(&mut self, kind: RecordedKind) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.created.push((id, kind));
        id
    }
}

/// Identity of a recorded object; reports the release when dropped.
struct Tracked {
    id: ResourceId,
    ledger: Rc<RefCell<Ledger>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.ledger.borrow_mut().released.push(self.id);
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&self.id).finish()
    }
}

#[derive(Debug)]
pub struct RecordedBuffer {
    tracked: Tracked,
    pub usage: BufferUsage,
    pub binding: BufferBinding,
    pub contents: Vec<u8>,
}

#[derive(Debug)]
pub struct RecordedShader {
    tracked: Tracked,
    pub stage: ShaderStage,
    pub entry_point: String,
    pub compiled_from_source: bool,
}

#[derive(Debug)]
pub struct RecordedInputLayout {
    tracked: Tracked,
    pub elements: Vec<VertexElement>,
    pub stride: u64,
    pub vertex_shader: ResourceId,
}

#[derive(Debug)]
pub struct RecordedPipeline {
    tracked: Tracked,
    pub vertex_shader: ResourceId,
    pub pixel_shader: ResourceId,
    pub input_layout: ResourceId,
    pub topology: Topology,
}

#[derive(Debug)]
pub struct RecordedTexture {
    tracked: Tracked,
    pub width: u32,
    pub height: u32,
}

macro_rules! impl_id {
    ($($ty:ty),*) => {
        $(impl $ty {
            pub fn id(&self) -> ResourceId {
                self.tracked.id
            }
        })*
    };
}

impl_id!(RecordedBuffer, RecordedShader, RecordedInputLayout, RecordedPipeline, RecordedTexture);

/// Device that creates bookkeeping objects instead of GPU objects.
#[derive(Default)]
pub struct RecordingDevice {
    ledger: Rc<RefCell<Ledger>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `op` fail until [`accept`](Self::accept) is called.
    pub fn reject(&self, op: DeviceOp) {
        self.ledger.borrow_mut().rejected.insert(op);
    }

    pub fn accept(&self, op: DeviceOp) {
        self.ledger.borrow_mut().rejected.remove(&op);
    }

    pub fn created_count(&self) -> usize {
        self.ledger.borrow().created.len()
    }

    pub fn created_of_kind(&self, kind: RecordedKind) -> usize {
        self.ledger
            .borrow()
            .created
            .iter()
            .filter(|(_, k)| *k == kind)
            .count()
    }

    pub fn released_count(&self) -> usize {
        self.ledger.borrow().released.len()
    }

    /// Number of times `id` was released. Anything above one is a double release.
    pub fn release_count(&self, id: ResourceId) -> usize {
        self.ledger
            .borrow()
            .released
            .iter()
            .filter(|r| **r == id)
            .count()
    }

    /// Objects created and not yet released.
    pub fn live_count(&self) -> usize {
        let ledger = self.ledger.borrow();
        ledger
            .created
            .iter()
            .filter(|(id, _)| !ledger.released.contains(id))
            .count()
    }

    fn track(&self, op: DeviceOp, kind: RecordedKind) -> Result<Tracked, DeviceError> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.check(op)?;
        let id = ledger.allocate(kind);
        Ok(Tracked {
            id,
            ledger: Rc::clone(&self.ledger),
        })
    }
}

impl GpuDevice for RecordingDevice {
    type Buffer = RecordedBuffer;
    type Shader = RecordedShader;
    type InputLayout = RecordedInputLayout;
    type Pipeline = RecordedPipeline;
    type Texture = RecordedTexture;

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<RecordedBuffer, DeviceError> {
        if desc.contents.is_empty() {
            return Err(DeviceError::InvalidDescriptor("zero-sized buffer".to_string()));
        }

        let op = match desc.usage {
            BufferUsage::Immutable => DeviceOp::ImmutableBuffer,
            BufferUsage::Default => DeviceOp::DefaultBuffer,
        };

        Ok(RecordedBuffer {
            tracked: self.track(op, RecordedKind::Buffer)?,
            usage: desc.usage,
            binding: desc.binding,
            contents: desc.contents.to_vec(),
        })
    }

    fn create_shader(
        &self,
        program: &ShaderProgram,
        _label: Option<&str>,
    ) -> Result<RecordedShader, DeviceError> {
        if let ShaderCode::Source(text) = &program.code {
            self.ledger.borrow().check(DeviceOp::Compile).map_err(|_| {
                DeviceError::Compilation(format!("{}: rejected by test device", program.origin.display()))
            })?;
            if !text.contains(&format!("fn {}", program.entry_point)) {
                return Err(DeviceError::Compilation(format!(
                    "entry point `{}` not found",
                    program.entry_point
                )));
            }
        }

        let op = match program.stage {
            ShaderStage::Vertex => DeviceOp::VertexShader,
            ShaderStage::Fragment => DeviceOp::PixelShader,
        };

        Ok(RecordedShader {
            tracked: self.track(op, RecordedKind::Shader)?,
            stage: program.stage,
            entry_point: program.entry_point.clone(),
            compiled_from_source: program.is_source(),
        })
    }

    fn create_input_layout(
        &self,
        elements: &[VertexElement],
        stride: u64,
        vertex_shader: &RecordedShader,
    ) -> Result<RecordedInputLayout, DeviceError> {
        if vertex_shader.stage != ShaderStage::Vertex {
            return Err(DeviceError::InvalidDescriptor(
                "input layout needs a vertex shader".to_string(),
            ));
        }
        if let Some(e) = elements.iter().find(|e| e.offset + e.format.size() > stride) {
            return Err(DeviceError::InvalidDescriptor(format!(
                "element {} ends past stride {stride}",
                e.semantic
            )));
        }

        Ok(RecordedInputLayout {
            tracked: self.track(DeviceOp::InputLayout, RecordedKind::InputLayout)?,
            elements: elements.to_vec(),
            stride,
            vertex_shader: vertex_shader.id(),
        })
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDesc<'_, Self>,
    ) -> Result<RecordedPipeline, DeviceError> {
        if desc.pixel_shader.stage != ShaderStage::Fragment {
            return Err(DeviceError::InvalidDescriptor(
                "pixel stage needs a fragment shader".to_string(),
            ));
        }

        Ok(RecordedPipeline {
            tracked: self.track(DeviceOp::Pipeline, RecordedKind::Pipeline)?,
            vertex_shader: desc.vertex_shader.id(),
            pixel_shader: desc.pixel_shader.id(),
            input_layout: desc.input_layout.id(),
            topology: desc.topology,
        })
    }

    fn create_texture(
        &self,
        image: &TextureImage,
        _label: Option<&str>,
    ) -> Result<RecordedTexture, DeviceError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DeviceError::InvalidDescriptor("zero-sized texture".to_string()));
        }

        Ok(RecordedTexture {
            tracked: self.track(DeviceOp::Texture, RecordedKind::Texture)?,
            width: image.width(),
            height: image.height(),
        })
    }
}

/// One recorded draw-context call.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Command {
    BindTexture {
        slot: u32,
        texture: ResourceId,
    },
    BindVertexBuffer {
        slot: u32,
        buffer: ResourceId,
        stride: u64,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: ResourceId,
        format: IndexFormat,
        offset: u64,
    },
    SetPipeline {
        pipeline: ResourceId,
    },
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
}

/// Draw context that appends every call to a command list.
#[derive(Debug, Default)]
pub struct RecordingContext {
    commands: Vec<Command>,
}

impl RecordingContext {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = &Command> {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed { .. }))
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl DrawContext<RecordingDevice> for RecordingContext {
    fn bind_texture(&mut self, slot: u32, texture: &RecordedTexture) {
        self.commands.push(Command::BindTexture {
            slot,
            texture: texture.id(),
        });
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: &RecordedBuffer, stride: u64, offset: u64) {
        self.commands.push(Command::BindVertexBuffer {
            slot,
            buffer: buffer.id(),
            stride,
            offset,
        });
    }

    fn bind_index_buffer(&mut self, buffer: &RecordedBuffer, format: IndexFormat, offset: u64) {
        self.commands.push(Command::BindIndexBuffer {
            buffer: buffer.id(),
            format,
            offset,
        });
    }

    fn set_pipeline(&mut self, pipeline: &RecordedPipeline) {
        self.commands.push(Command::SetPipeline {
            pipeline: pipeline.id(),
        });
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        });
    }
}
