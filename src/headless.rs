//! A GPU stand-in that allocates names and tracks live resources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;
use vrf_core::{GpuTextureUploader, Image, TextureId, TextureParameters, UploadError};
use vrf_render::{RenderBackend, RenderError, RenderTextureDesc, RenderTextureId};

pub struct HeadlessGpu {
    max_samples: u32,
    multiview: bool,
    next_render_texture: AtomicU64,
    next_texture: AtomicU32,
    render_textures: Mutex<HashMap<RenderTextureId, RenderTextureDesc>>,
    textures: Mutex<HashMap<TextureId, u32>>,
    uploaded_bytes: AtomicU64,
}

impl HeadlessGpu {
    pub fn new(max_samples: u32, multiview: bool) -> Self {
        Self {
            max_samples,
            multiview,
            next_render_texture: AtomicU64::new(1),
            next_texture: AtomicU32::new(1),
            render_textures: Mutex::new(HashMap::new()),
            textures: Mutex::new(HashMap::new()),
            uploaded_bytes: AtomicU64::new(0),
        }
    }

    pub fn live_render_textures(&self) -> usize {
        self.render_textures.lock().len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.lock().len()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes.load(Ordering::Relaxed)
    }
}

impl RenderBackend for HeadlessGpu {
    fn max_sample_count(&self) -> u32 {
        self.max_samples
    }

    fn supports_multiview(&self) -> bool {
        self.multiview
    }

    fn create_render_texture(&self, desc: &RenderTextureDesc) -> Result<RenderTextureId, RenderError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Backend(format!(
                "render texture size {}x{} is empty",
                desc.width, desc.height
            )));
        }
        let id = RenderTextureId(self.next_render_texture.fetch_add(1, Ordering::Relaxed));
        self.render_textures.lock().insert(id, *desc);
        Ok(id)
    }

    fn release_render_texture(&self, id: RenderTextureId) {
        self.render_textures.lock().remove(&id);
    }
}

impl GpuTextureUploader for HeadlessGpu {
    fn upload(&self, texture: TextureId, image: &Image, _params: &TextureParameters) -> Result<u32, UploadError> {
        if image.width == 0 || image.height == 0 {
            return Err(UploadError::Backend(format!("image for {:?} is empty", texture)));
        }
        let name = *self
            .textures
            .lock()
            .entry(texture)
            .or_insert_with(|| self.next_texture.fetch_add(1, Ordering::Relaxed));
        self.uploaded_bytes
            .fetch_add(image.pixels.len() as u64, Ordering::Relaxed);
        trace!("Uploaded {:?} as GPU texture {}", texture, name);
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vrf_core::Scene;
    use vrf_render::{ConstructionPolicy, RenderBundle, RenderConfig};

    #[test]
    fn bundle_textures_are_released_on_drop() {
        let gpu = Arc::new(HeadlessGpu::new(4, false));
        let config = RenderConfig {
            policy: ConstructionPolicy::Eager,
            ..RenderConfig::default()
        };
        let bundle = RenderBundle::new(gpu.clone(), &config, Scene::new("main")).unwrap();
        assert_eq!(gpu.live_render_textures(), 6);
        drop(bundle);
        assert_eq!(gpu.live_render_textures(), 0);
    }

    #[test]
    fn reuploads_keep_the_gpu_name() {
        let gpu = HeadlessGpu::new(4, false);
        let image = Image::solid("red", 2, 2, [255, 0, 0, 255]);
        let id = vrf_core::Texture::default().id();
        let first = gpu.upload(id, &image, &TextureParameters::default()).unwrap();
        let second = gpu.upload(id, &image, &TextureParameters::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(gpu.texture_count(), 1);
        assert_eq!(gpu.uploaded_bytes(), 32);
    }
}
