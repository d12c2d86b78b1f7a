//! Process-scoped caches shared by every load.
//!
//! Entries are never evicted. [`AssetCaches::reset`] clears everything and
//! runs from the process restart hook.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::info;

use vrf_core::Image;

use crate::identity::ResourceIdentity;

/// Side length of the placeholder bound to textures that fail to load.
pub const DEFAULT_IMAGE_SIZE: u32 = 32;

/// A keyed cache where the first writer wins.
pub struct ResourceCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> ResourceCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert `value` unless `key` is already present. Returns the value
    /// that ends up cached, so concurrent writers all converge on one.
    pub fn put(&self, key: K, value: V) -> V {
        self.entries.lock().entry(key).or_insert(value).clone()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}

impl<K: Eq + Hash, V: Clone> Default for ResourceCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded images keyed by resource identity.
pub type TextureCache = ResourceCache<ResourceIdentity, Arc<Image>>;

/// Raw file contents keyed by resource identity.
pub type ByteCache = ResourceCache<ResourceIdentity, Arc<Vec<u8>>>;

/// Images embedded in model files, keyed `"<model identity>*<index>"`.
pub type EmbeddedTextureCache = ResourceCache<String, Arc<Image>>;

/// All caches used by the asset loader.
#[derive(Default)]
pub struct AssetCaches {
    pub textures: TextureCache,
    pub bytes: ByteCache,
    pub embedded: EmbeddedTextureCache,
    default_image: Mutex<Option<Arc<Image>>>,
}

impl AssetCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide caches. The first call registers the restart hook.
    pub fn global() -> Arc<AssetCaches> {
        static GLOBAL: OnceLock<Arc<AssetCaches>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| {
            let caches = Arc::new(AssetCaches::new());
            let hook = Arc::clone(&caches);
            vrf_core::lifecycle::on_restart(move || hook.reset());
            caches
        }))
    }

    /// White placeholder image, created on first use.
    pub fn default_image(&self) -> Arc<Image> {
        let mut slot = self.default_image.lock();
        Arc::clone(slot.get_or_insert_with(|| {
            Arc::new(Image::solid(
                "default",
                DEFAULT_IMAGE_SIZE,
                DEFAULT_IMAGE_SIZE,
                [255, 255, 255, 255],
            ))
        }))
    }

    /// Drop every cached entry, including the placeholder image.
    pub fn reset(&self) {
        info!(
            "Resetting asset caches ({} textures, {} files, {} embedded)",
            self.textures.len(),
            self.bytes.len(),
            self.embedded.len()
        );
        self.textures.reset();
        self.bytes.reset();
        self.embedded.reset();
        *self.default_image.lock() = None;
    }
}
