use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use vrf_core::EventManager;

use crate::cache::AssetCaches;
use crate::decode;
use crate::error::AssetError;
use crate::texture_request::TextureRequest;
use crate::upload::UploadQueue;
use crate::volume::Resource;

/// State shared by every request issued through one loader.
pub struct LoadContext {
    pub(crate) runtime: Handle,
    pub(crate) caches: Arc<AssetCaches>,
    pub(crate) events: Arc<EventManager>,
    pub(crate) uploads: Arc<UploadQueue>,
}

impl LoadContext {
    pub fn new(runtime: Handle, caches: Arc<AssetCaches>, events: Arc<EventManager>, uploads: Arc<UploadQueue>) -> Self {
        Self {
            runtime,
            caches,
            events,
            uploads,
        }
    }

    pub fn caches(&self) -> &Arc<AssetCaches> {
        &self.caches
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn uploads(&self) -> &Arc<UploadQueue> {
        &self.uploads
    }

    /// Resolve `request` from `resource`.
    ///
    /// A cache hit completes on the calling thread. Otherwise the read and
    /// decode run on the blocking pool and the request fires from there.
    pub fn load_texture(&self, request: TextureRequest, resource: Resource, use_cache: bool) {
        let identity = resource.identity().clone();
        if use_cache {
            if let Some(image) = self.caches.textures.get(&identity) {
                debug!("Texture cache hit: {}", identity);
                request.loaded(image);
                return;
            }
        }
        if !request.still_wanted() {
            request.failed(AssetError::Abandoned(identity.to_string()));
            return;
        }

        let caches = Arc::clone(&self.caches);
        self.runtime.spawn_blocking(move || {
            if !request.still_wanted() {
                request.failed(AssetError::Abandoned(identity.to_string()));
                return;
            }
            let name = identity.to_string();
            let decoded = resource
                .read_all()
                .and_then(|bytes| decode::decode_image(&name, &bytes));
            match decoded {
                Ok(image) => {
                    let image = Arc::new(image);
                    let image = if use_cache {
                        caches.textures.put(identity, image)
                    } else {
                        image
                    };
                    request.loaded(image);
                }
                Err(e) => request.failed(e),
            }
        });
    }
}
