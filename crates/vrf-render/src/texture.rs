use std::sync::Arc;

use tracing::debug;

use crate::error::RenderError;

/// Backend name of a render texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTextureId(pub u64);

/// Shape of a render texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTextureDesc {
    pub width: u32,
    pub height: u32,
    /// 0 = no multisampling
    pub samples: u32,
    /// 2 for multiview targets, 1 otherwise
    pub layers: u32,
    /// Swapchain image provided by the compositor, if any.
    pub external: Option<u64>,
}

/// GPU side of render targets. Only called from the render thread.
pub trait RenderBackend: Send + Sync {
    fn max_sample_count(&self) -> u32;

    fn supports_multiview(&self) -> bool;

    fn create_render_texture(&self, desc: &RenderTextureDesc) -> Result<RenderTextureId, RenderError>;

    fn release_render_texture(&self, id: RenderTextureId);
}

/// An offscreen colour buffer. Released on drop.
pub struct RenderTexture {
    id: RenderTextureId,
    desc: RenderTextureDesc,
    backend: Arc<dyn RenderBackend>,
}

impl RenderTexture {
    pub fn new(backend: &Arc<dyn RenderBackend>, desc: RenderTextureDesc) -> Result<Self, RenderError> {
        let id = backend.create_render_texture(&desc)?;
        debug!(
            "Created render texture {:?} {}x{} samples={} layers={}",
            id, desc.width, desc.height, desc.samples, desc.layers
        );
        Ok(Self {
            id,
            desc,
            backend: Arc::clone(backend),
        })
    }

    pub fn id(&self) -> RenderTextureId {
        self.id
    }

    pub fn desc(&self) -> &RenderTextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn sample_count(&self) -> u32 {
        self.desc.samples
    }

    pub fn layers(&self) -> u32 {
        self.desc.layers
    }

    pub fn is_external(&self) -> bool {
        self.desc.external.is_some()
    }
}

impl Drop for RenderTexture {
    fn drop(&mut self) {
        debug!("Releasing render texture {:?}", self.id);
        self.backend.release_render_texture(self.id);
    }
}

impl std::fmt::Debug for RenderTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTexture")
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}
