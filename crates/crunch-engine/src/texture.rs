//! Texture sub-object.
//!
//! A [`Texture`] starts as an empty placeholder, is loaded from an image file,
//! binds itself to a texture slot, and releases its GPU object on demand or
//! when dropped.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::backend::{DeviceError, DrawContext, GpuDevice};

/// Decoded RGBA8 pixels, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl TextureImage {
    /// Decodes any format enabled on the `image` crate and converts it to RGBA8.
    pub fn open(path: &Path) -> Result<Self, TextureError> {
        let decoded = image::open(path).map_err(|source| TextureError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to decode texture {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("device rejected texture {}", .path.display())]
    Creation {
        path: PathBuf,
        #[source]
        source: DeviceError,
    },
}

/// GPU image + sampler owned by one primitive.
pub struct Texture<D: GpuDevice> {
    handle: Option<D::Texture>,
    path: Option<PathBuf>,
}

impl<D: GpuDevice> Default for Texture<D> {
    fn default() -> Self {
        Self {
            handle: None,
            path: None,
        }
    }
}

impl<D: GpuDevice> Texture<D> {
    /// Decodes `path` and creates the GPU texture.
    pub fn load(device: &D, path: impl AsRef<Path>) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let image = TextureImage::open(path)?;
        let label = path.display().to_string();

        let handle = device
            .create_texture(&image, Some(&label))
            .map_err(|source| TextureError::Creation {
                path: path.to_path_buf(),
                source,
            })?;

        log::debug!(
            "texture {} loaded ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );

        Ok(Self {
            handle: Some(handle),
            path: Some(path.to_path_buf()),
        })
    }

    /// Loads `path` into this texture. On failure the current contents are kept.
    pub fn init(&mut self, device: &D, path: impl AsRef<Path>) -> Result<(), TextureError> {
        *self = Self::load(device, path)?;
        Ok(())
    }

    /// Binds to `slot`. An empty texture binds nothing.
    pub fn bind<C>(&self, ctx: &mut C, slot: u32)
    where
        C: DrawContext<D> + ?Sized,
    {
        if let Some(handle) = &self.handle {
            ctx.bind_texture(slot, handle);
        }
    }

    /// Drops the GPU texture. Calling it again is a no-op.
    pub fn release(&mut self) {
        if self.handle.take().is_some() {
            if let Some(path) = &self.path {
                log::debug!("texture {} released", path.display());
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Source file of the currently or last loaded image.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn handle(&self) -> Option<&D::Texture> {
        self.handle.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::recording::DeviceOp;
    use crate::backend::{Command, RecordingContext, RecordingDevice};

    fn write_png(name: &str, width: u32, height: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!("crunch-texture-{name}-{}.png", std::process::id()));
        image::RgbaImage::from_pixel(width, height, image::Rgba([255, 128, 0, 255]))
            .save(&path)
            .expect("write fixture png");
        path
    }

    #[test]
    fn open_decodes_to_rgba8() {
        let path = write_png("decode", 3, 2);
        let image = TextureImage::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        assert_eq!(image.pixels().len(), 3 * 2 * 4);
        assert_eq!(&image.pixels()[..4], &[255, 128, 0, 255]);
    }

    #[test]
    fn default_is_empty_and_binds_nothing() {
        let texture = Texture::<RecordingDevice>::default();
        let mut ctx = RecordingContext::default();
        texture.bind(&mut ctx, 0);
        assert!(!texture.is_loaded());
        assert!(ctx.commands().is_empty());
    }

    #[test]
    fn init_then_bind_then_release() {
        let device = RecordingDevice::new();
        let path = write_png("lifecycle", 4, 4);

        let mut texture = Texture::default();
        texture.init(&device, &path).unwrap();
        assert!(texture.is_loaded());
        assert_eq!(texture.path(), Some(path.as_path()));

        let mut ctx = RecordingContext::default();
        texture.bind(&mut ctx, 0);
        let id = texture.handle().map(|t| t.id()).unwrap();
        assert_eq!(ctx.commands(), &[Command::BindTexture { slot: 0, texture: id }]);

        texture.release();
        texture.release();
        assert!(!texture.is_loaded());
        assert_eq!(device.release_count(id), 1);
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let device = RecordingDevice::new();
        let mut texture = Texture::default();
        let err = texture.init(&device, "/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
        assert_eq!(device.created_count(), 0);
    }

    #[test]
    fn device_rejection_keeps_previous_texture() {
        let device = RecordingDevice::new();
        let path = write_png("rejection", 2, 2);

        let mut texture = Texture::default();
        texture.init(&device, &path).unwrap();

        device.reject(DeviceOp::Texture);
        let err = texture.init(&device, &path).unwrap_err();
        assert!(matches!(err, TextureError::Creation { .. }));
        assert!(texture.is_loaded());
        assert_eq!(device.live_count(), 1);
    }
}
