use std::sync::Arc;

use tracing::{debug, warn};

use vrf_core::{AssetEvents, Image, Texture};

use crate::context::LoadContext;
use crate::error::AssetError;
use crate::request::AssetRequest;

/// Receives the outcome of a single texture load.
#[allow(unused_variables)]
pub trait TextureCallback: Send + Sync {
    fn loaded(&self, texture: &Texture, image: &Arc<Image>) {}

    fn failed(&self, error: &AssetError) {}

    /// Asked before decoding starts. Returning false abandons the load,
    /// which is reported as a failure.
    fn still_wanted(&self) -> bool {
        true
    }
}

/// One pending texture load. Fires exactly once, then is gone.
pub struct TextureRequest {
    context: Arc<LoadContext>,
    texture: Texture,
    file: String,
    callback: Option<Arc<dyn TextureCallback>>,
    asset: Option<Arc<AssetRequest>>,
}

impl TextureRequest {
    /// A stand-alone request. Events go to the broadcast manager.
    pub fn new(
        context: Arc<LoadContext>,
        texture: Texture,
        file: impl Into<String>,
        callback: Option<Arc<dyn TextureCallback>>,
    ) -> Self {
        Self {
            context,
            texture,
            file: file.into(),
            callback,
            asset: None,
        }
    }

    /// A request on behalf of a model load. Events go to the asset request.
    pub fn for_asset(asset: &Arc<AssetRequest>, texture: Texture, file: impl Into<String>) -> Self {
        Self {
            context: Arc::clone(asset.context()),
            texture,
            file: file.into(),
            callback: None,
            asset: Some(Arc::clone(asset)),
        }
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn still_wanted(&self) -> bool {
        self.callback.as_ref().map_or(true, |cb| cb.still_wanted())
    }

    /// Bind `image`, queue the GPU upload and report success.
    pub fn loaded(self, image: Arc<Image>) {
        debug!("Texture loaded: {} ({}x{})", self.file, image.width, image.height);
        self.texture.set_image(Arc::clone(&image));
        self.context.uploads.push(self.texture.clone());
        if let Some(cb) = &self.callback {
            cb.loaded(&self.texture, &image);
        }
        match &self.asset {
            Some(asset) => asset.on_texture_loaded(&self.texture, &self.file),
            None => self.context.events.on_texture_loaded(&self.texture, &self.file),
        }
    }

    /// Report failure. Textures of a model load get the placeholder image
    /// so the model still renders.
    pub fn failed(self, error: AssetError) {
        warn!("Texture failed: {}", error);
        if let Some(cb) = &self.callback {
            cb.failed(&error);
        }
        let message = error.to_string();
        match &self.asset {
            Some(asset) => {
                self.texture.set_image(self.context.caches.default_image());
                self.context.uploads.push(self.texture.clone());
                asset.on_texture_error(&message, &self.file);
            }
            None => self.context.events.on_texture_error(&message, &self.file),
        }
    }
}
