use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::{debug, warn};

use vrf_core::{GpuTextureUploader, Texture, UploadError};

/// Textures whose pixels are ready but whose GPU object does not exist yet.
///
/// Loader workers push; the render thread drains with [`UploadQueue::flush`].
#[derive(Default)]
pub struct UploadQueue {
    pending: Mutex<Vec<Texture>>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, texture: Texture) {
        self.pending.lock().push(texture);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Upload every queued texture. Returns the number uploaded.
    ///
    /// A texture queued twice is uploaded once with its latest image.
    pub fn flush(&self, uploader: &dyn GpuTextureUploader) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock());
        let mut seen = HashSet::new();
        let mut uploaded = 0;
        for texture in batch.iter().rev() {
            if !seen.insert(texture.id()) {
                continue;
            }
            let result = match texture.image() {
                Some(image) => uploader.upload(texture.id(), &image, &texture.parameters()),
                None => Err(UploadError::NoImage(texture.id())),
            };
            match result {
                Ok(name) => {
                    texture.mark_uploaded(name);
                    uploaded += 1;
                }
                Err(e) => warn!("Texture upload failed: {}", e),
            }
        }
        if uploaded > 0 {
            debug!("Uploaded {} textures", uploaded);
        }
        uploaded
    }
}
