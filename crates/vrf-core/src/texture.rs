//! Texture handles and decoded images.
//!
//! A [`Texture`] is created by the caller before its pixels exist. Loaders fill
//! it from worker threads with [`Texture::set_image`]; the render thread later
//! creates the GPU resource through a [`GpuTextureUploader`].

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Unique identifier of a texture handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

impl TextureId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Decoded RGBA8 pixel data.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Image {
    /// Wrap RGBA8 pixels. Returns `None` when the buffer does not match the size.
    pub fn from_rgba(name: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            name: name.into(),
            width,
            height,
            pixels,
        })
    }

    /// A single-colour image.
    pub fn solid(name: impl Into<String>, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            name: name.into(),
            width,
            height,
            pixels,
        }
    }

    /// RGBA value of the pixel at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureFilter {
    Nearest,
    Linear,
    LinearMipmapNearest,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureWrap {
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

/// Sampling parameters applied when the texture is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureParameters {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    pub anisotropy: f32,
}

impl Default for TextureParameters {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::LinearMipmapNearest,
            mag_filter: TextureFilter::Linear,
            wrap_s: TextureWrap::ClampToEdge,
            wrap_t: TextureWrap::ClampToEdge,
            anisotropy: 1.0,
        }
    }
}

struct TextureInner {
    id: TextureId,
    params: RwLock<TextureParameters>,
    image: RwLock<Option<Arc<Image>>>,
    // 0 = not uploaded
    gpu_name: AtomicU32,
}

/// Shared handle to a texture. Cloning shares the same texture.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl Texture {
    pub fn new(params: TextureParameters) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                id: TextureId::next(),
                params: RwLock::new(params),
                image: RwLock::new(None),
                gpu_name: AtomicU32::new(0),
            }),
        }
    }

    pub fn id(&self) -> TextureId {
        self.inner.id
    }

    /// The image currently bound to this texture, if any.
    pub fn image(&self) -> Option<Arc<Image>> {
        self.inner.image.read().clone()
    }

    /// Bind a new image. The previous GPU upload becomes stale.
    pub fn set_image(&self, image: Arc<Image>) {
        *self.inner.image.write() = Some(image);
        self.inner.gpu_name.store(0, Ordering::Release);
    }

    pub fn parameters(&self) -> TextureParameters {
        *self.inner.params.read()
    }

    pub fn set_parameters(&self, params: TextureParameters) {
        *self.inner.params.write() = params;
    }

    /// GPU object name assigned by the last upload.
    pub fn gpu_name(&self) -> Option<u32> {
        match self.inner.gpu_name.load(Ordering::Acquire) {
            0 => None,
            name => Some(name),
        }
    }

    /// Record the GPU object created for the current image.
    pub fn mark_uploaded(&self, name: u32) {
        self.inner.gpu_name.store(name, Ordering::Release);
    }

    /// Whether an image is bound and uploaded.
    pub fn is_ready(&self) -> bool {
        self.gpu_name().is_some() && self.inner.image.read().is_some()
    }

    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Texture {
    fn default() -> Self {
        Self::new(TextureParameters::default())
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Texture {}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("image", &self.image().map(|i| i.name.clone()))
            .field("gpu_name", &self.gpu_name())
            .finish()
    }
}

/// Errors reported by the GPU texture upload backend.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("texture {0:?} has no image to upload")]
    NoImage(TextureId),

    #[error("GPU upload failed: {0}")]
    Backend(String),
}

/// Creates or updates a GPU texture from decoded pixels.
///
/// Implementations are only ever called from the render thread.
pub trait GpuTextureUploader {
    /// Upload `image` for `texture` and return the GPU object name (non-zero).
    fn upload(&self, texture: TextureId, image: &Image, params: &TextureParameters) -> Result<u32, UploadError>;
}
