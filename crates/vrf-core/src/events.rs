//! Asset event fan-out.
//!
//! Every asset event goes to at most one user handler, then to the
//! process-wide [`EventManager`] broadcast.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::scene::SceneNode;
use crate::texture::Texture;

/// Receiver of asset loading events. All methods default to no-ops.
///
/// Events arrive on loader worker threads as well as the calling thread;
/// handlers must hop to the render thread themselves for GPU work.
#[allow(unused_variables)]
pub trait AssetEvents: Send + Sync {
    /// Model import finished. Textures may still be outstanding.
    fn on_model_loaded(&self, model: &Arc<SceneNode>, file: &str) {}

    fn on_model_error(&self, error: &str, file: &str) {}

    fn on_texture_loaded(&self, texture: &Texture, file: &str) {}

    fn on_texture_error(&self, error: &str, file: &str) {}

    /// Terminal event: the model and all of its textures are resolved.
    /// `model` is `None` when import failed; `errors` is `None` when nothing failed.
    fn on_asset_loaded(&self, model: Option<&Arc<SceneNode>>, file: &str, errors: Option<&str>) {}
}

/// Token returned by [`EventManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Process-wide broadcast of asset events to every subscriber, in
/// subscription order.
#[derive(Default)]
pub struct EventManager {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Arc<dyn AssetEvents>)>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The broadcast shared by every loader in the process.
    pub fn global() -> Arc<EventManager> {
        static GLOBAL: OnceLock<Arc<EventManager>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(EventManager::new())))
    }

    pub fn subscribe(&self, handler: Arc<dyn AssetEvents>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, handler));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    // Snapshot so handlers may (un)subscribe from inside a callback.
    fn snapshot(&self) -> Vec<Arc<dyn AssetEvents>> {
        self.subscribers.read().iter().map(|(_, h)| Arc::clone(h)).collect()
    }
}

impl AssetEvents for EventManager {
    fn on_model_loaded(&self, model: &Arc<SceneNode>, file: &str) {
        for h in self.snapshot() {
            h.on_model_loaded(model, file);
        }
    }

    fn on_model_error(&self, error: &str, file: &str) {
        for h in self.snapshot() {
            h.on_model_error(error, file);
        }
    }

    fn on_texture_loaded(&self, texture: &Texture, file: &str) {
        for h in self.snapshot() {
            h.on_texture_loaded(texture, file);
        }
    }

    fn on_texture_error(&self, error: &str, file: &str) {
        for h in self.snapshot() {
            h.on_texture_error(error, file);
        }
    }

    fn on_asset_loaded(&self, model: Option<&Arc<SceneNode>>, file: &str, errors: Option<&str>) {
        for h in self.snapshot() {
            h.on_asset_loaded(model, file, errors);
        }
    }
}

/// Two-slot dispatch table: optional user handler, then the broadcast manager.
#[derive(Clone)]
pub struct EventDispatch {
    primary: Option<Arc<dyn AssetEvents>>,
    broadcast: Arc<EventManager>,
}

impl EventDispatch {
    pub fn new(primary: Option<Arc<dyn AssetEvents>>, broadcast: Arc<EventManager>) -> Self {
        Self { primary, broadcast }
    }

    /// Deliver one event to the user handler first, then the broadcast.
    pub fn emit(&self, event: impl Fn(&dyn AssetEvents)) {
        if let Some(primary) = &self.primary {
            event(&**primary);
        }
        event(&*self.broadcast);
    }
}
