//! Per-model load coordination.
//!
//! An [`AssetRequest`] counts the textures a model load has dispatched and
//! fires the terminal `on_asset_loaded` event exactly once, when the model
//! is recorded and the count is back to zero, or immediately when import
//! fails.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use vrf_core::{AssetEvents, EventDispatch, Scene, SceneNode, Texture, TextureParameters};

use crate::config::{ImportSettings, LoaderConfig};
use crate::context::LoadContext;
use crate::decode;
use crate::error::AssetError;
use crate::import::EmbeddedTexture;
use crate::loader::LoadOptions;
use crate::texture_request::TextureRequest;
use crate::volume::{base_name, ResourceVolume};

/// Name of the node whose camera replaces the scene's main camera rig.
pub const MAIN_CAMERA_NODE: &str = "MainCamera";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Importing,
    ImportFailed,
    WaitingTextures,
    Resolved,
}

/// Outcome of a finished model load.
#[derive(Debug, Clone)]
pub struct AssetLoaded {
    /// `None` when import failed.
    pub model: Option<Arc<SceneNode>>,
    pub file_name: String,
    /// Every failure, newline separated. `None` when nothing failed.
    pub errors: Option<String>,
}

/// Completion latch for a model load.
pub struct PendingAsset {
    receiver: mpsc::Receiver<AssetLoaded>,
}

impl PendingAsset {
    /// Check for completion without blocking.
    pub fn try_recv(&self) -> Option<AssetLoaded> {
        self.receiver.try_recv().ok()
    }

    /// Block until the load completes.
    pub fn wait(self) -> Result<AssetLoaded, AssetError> {
        self.receiver
            .recv()
            .map_err(|_| AssetError::Runtime("load request dropped before completion".into()))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<AssetLoaded> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

struct Progress {
    state: RequestState,
    outstanding: usize,
    model: Option<Arc<SceneNode>>,
    errors: Vec<String>,
    fired: bool,
}

/// Coordinates the load of one model and its textures.
pub struct AssetRequest {
    context: Arc<LoadContext>,
    volume: Arc<dyn ResourceVolume>,
    file_name: String,
    model_root: Arc<SceneNode>,
    scene: Option<Arc<Scene>>,
    replace_scene: bool,
    dispatch: EventDispatch,
    settings: ImportSettings,
    cache_enabled: bool,
    texture_parameters: TextureParameters,
    progress: Mutex<Progress>,
    completion: Mutex<Option<mpsc::Sender<AssetLoaded>>>,
}

impl AssetRequest {
    pub fn new(
        context: Arc<LoadContext>,
        volume: Arc<dyn ResourceVolume>,
        options: LoadOptions,
        config: &LoaderConfig,
    ) -> (Arc<Self>, PendingAsset) {
        let (tx, rx) = mpsc::channel();
        let file_name = volume.file_name().to_string();
        let dispatch = EventDispatch::new(options.handler, Arc::clone(&context.events));
        let request = Arc::new(Self {
            model_root: SceneNode::new(base_name(&file_name)),
            file_name,
            volume,
            scene: options.scene,
            replace_scene: options.replace_scene,
            dispatch,
            settings: options.settings.unwrap_or(config.import),
            cache_enabled: options.cache_enabled.unwrap_or(config.cache_enabled),
            texture_parameters: options.texture_parameters,
            progress: Mutex::new(Progress {
                state: RequestState::Created,
                outstanding: 0,
                model: None,
                errors: Vec::new(),
                fired: false,
            }),
            completion: Mutex::new(Some(tx)),
            context,
        });
        (request, PendingAsset { receiver: rx })
    }

    pub fn context(&self) -> &Arc<LoadContext> {
        &self.context
    }

    pub fn volume(&self) -> &Arc<dyn ResourceVolume> {
        &self.volume
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Root node handed to the caller before import starts.
    pub fn model_root(&self) -> &Arc<SceneNode> {
        &self.model_root
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn texture_parameters(&self) -> TextureParameters {
        self.texture_parameters
    }

    pub fn state(&self) -> RequestState {
        self.progress.lock().state
    }

    pub fn outstanding_textures(&self) -> usize {
        self.progress.lock().outstanding
    }

    /// Errors recorded so far, newline separated.
    pub fn errors(&self) -> Option<String> {
        join_errors(&self.progress.lock().errors)
    }

    pub(crate) fn begin_import(&self) {
        let mut progress = self.progress.lock();
        if progress.state == RequestState::Created {
            progress.state = RequestState::Importing;
        }
    }

    /// Count one more texture in flight. Returns false once the request can
    /// no longer accept textures.
    pub(crate) fn begin_texture(&self, file: &str) -> bool {
        let mut progress = self.progress.lock();
        if progress.fired || progress.state == RequestState::ImportFailed {
            debug!("Ignoring texture {} for finished load of {}", file, self.file_name);
            return false;
        }
        progress.outstanding += 1;
        debug!(
            "Loading texture {} for {} ({} outstanding)",
            file, self.file_name, progress.outstanding
        );
        true
    }

    /// Dispatch a texture stored in the volume.
    pub fn load_texture(&self, request: TextureRequest) {
        if !self.begin_texture(request.file()) {
            return;
        }
        match self.volume.open_resource(request.file()) {
            Ok(resource) => self.context.load_texture(request, resource, self.cache_enabled),
            Err(e) => request.failed(e),
        }
    }

    /// Decode a texture embedded in the model file, inline.
    pub fn load_embedded_texture(&self, request: TextureRequest, embedded: &EmbeddedTexture) {
        if !self.begin_texture(request.file()) {
            return;
        }
        let key = format!("{}{}", self.volume.identity(&self.file_name), request.file());
        if let Some(image) = self.context.caches.embedded.get(&key) {
            request.loaded(image);
            return;
        }
        let decoded = match embedded {
            EmbeddedTexture::Compressed { bytes, .. } => decode::decode_image(&key, bytes),
            EmbeddedTexture::Argb { width, height, pixels } => decode::image_from_argb(&key, *width, *height, pixels),
        };
        match decoded {
            Ok(image) => {
                let image = self.context.caches.embedded.put(key, Arc::new(image));
                request.loaded(image);
            }
            Err(e) => request.failed(e),
        }
    }

    /// Import produced `model`. Fires the terminal event now if no textures are outstanding.
    pub fn on_model_loaded(&self, model: &Arc<SceneNode>) {
        self.dispatch.emit(|h| h.on_model_loaded(model, &self.file_name));
        let fire = {
            let mut progress = self.progress.lock();
            if progress.fired {
                false
            } else {
                progress.model = Some(Arc::clone(model));
                info!(
                    "Model {} loaded, {} textures outstanding",
                    self.file_name, progress.outstanding
                );
                if progress.outstanding == 0 {
                    progress.state = RequestState::Resolved;
                    progress.fired = true;
                    true
                } else {
                    progress.state = RequestState::WaitingTextures;
                    false
                }
            }
        };
        if fire {
            self.generate_load_event();
        }
    }

    /// Import failed. Fires the terminal event immediately with no model.
    pub fn on_model_error(&self, message: &str) {
        error!("Model {} did not load: {}", self.file_name, message);
        self.dispatch.emit(|h| h.on_model_error(message, &self.file_name));
        let fire = {
            let mut progress = self.progress.lock();
            progress.errors.push(message.to_string());
            progress.model = None;
            progress.outstanding = 0;
            progress.state = RequestState::ImportFailed;
            !std::mem::replace(&mut progress.fired, true)
        };
        if fire {
            self.generate_load_event();
        }
    }

    pub fn on_texture_loaded(&self, texture: &Texture, file: &str) {
        self.dispatch.emit(|h| h.on_texture_loaded(texture, file));
        self.texture_resolved(file);
    }

    pub fn on_texture_error(&self, message: &str, file: &str) {
        self.progress.lock().errors.push(message.to_string());
        self.dispatch.emit(|h| h.on_texture_error(message, file));
        self.texture_resolved(file);
    }

    fn texture_resolved(&self, file: &str) {
        let fire = {
            let mut progress = self.progress.lock();
            let Some(remaining) = progress.outstanding.checked_sub(1) else {
                warn!("Texture {} resolved for {} with none outstanding", file, self.file_name);
                return;
            };
            progress.outstanding = remaining;
            if remaining == 0 && !progress.fired && progress.model.is_some() {
                progress.state = RequestState::Resolved;
                progress.fired = true;
                true
            } else {
                false
            }
        };
        if fire {
            self.generate_load_event();
        }
    }

    // Runs once per request, outside the progress lock.
    fn generate_load_event(&self) {
        let (model, errors) = {
            let progress = self.progress.lock();
            (progress.model.clone(), join_errors(&progress.errors))
        };

        if let Some(model) = &model {
            if let Some(scene) = &self.scene {
                if model.parent().is_none() {
                    if self.replace_scene {
                        self.replace_scene_contents(scene, model);
                    }
                    scene.add_node(Arc::clone(model));
                    info!("Asset {} added to scene {}", self.file_name, scene.name());
                }
            }
            if let Some(animator) = model.animator() {
                if animator.auto_start {
                    animator.start();
                }
            }
        }

        self.dispatch
            .emit(|h| h.on_asset_loaded(model.as_ref(), &self.file_name, errors.as_deref()));

        if let Some(tx) = self.completion.lock().take() {
            let _ = tx.send(AssetLoaded {
                model,
                file_name: self.file_name.clone(),
                errors,
            });
        }
    }

    fn replace_scene_contents(&self, scene: &Scene, model: &Arc<SceneNode>) {
        scene.clear();
        let Some(camera_node) = model.find_by_name(MAIN_CAMERA_NODE) else {
            return;
        };
        let params = camera_node.camera().unwrap_or_default();
        let transform = camera_node.transform();
        scene.update_camera_rig(|rig| {
            rig.transform = transform;
            rig.near = params.near;
            rig.far = params.far;
            rig.rig_type = params.rig_type;
        });
        debug!("Main camera rig taken from {}", self.file_name);
    }
}

fn join_errors(errors: &[String]) -> Option<String> {
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    use rand::seq::SliceRandom;
    use vrf_core::{EventManager, Transform, Vec3};

    use crate::cache::AssetCaches;
    use crate::upload::UploadQueue;
    use crate::volume::MemoryVolume;

    #[derive(Default)]
    struct Terminal {
        fired: AtomicUsize,
        model_present: AtomicUsize,
        last_errors: Mutex<Option<String>>,
    }

    impl AssetEvents for Terminal {
        fn on_asset_loaded(&self, model: Option<&Arc<SceneNode>>, _file: &str, errors: Option<&str>) {
            self.fired.fetch_add(1, Ordering::SeqCst);
            if model.is_some() {
                self.model_present.fetch_add(1, Ordering::SeqCst);
            }
            *self.last_errors.lock() = errors.map(str::to_string);
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap()
    }

    fn request_with(
        rt: &tokio::runtime::Runtime,
        options: LoadOptions,
    ) -> (Arc<AssetRequest>, PendingAsset) {
        let context = Arc::new(LoadContext::new(
            rt.handle().clone(),
            Arc::new(AssetCaches::new()),
            Arc::new(EventManager::new()),
            Arc::new(UploadQueue::new()),
        ));
        let volume: Arc<dyn ResourceVolume> = Arc::new(MemoryVolume::new("mem", "models/ship.gltf"));
        AssetRequest::new(context, volume, options, &LoaderConfig::default())
    }

    fn tracked(rt: &tokio::runtime::Runtime) -> (Arc<AssetRequest>, PendingAsset, Arc<Terminal>) {
        let terminal = Arc::new(Terminal::default());
        let options = LoadOptions::new().handler(Arc::clone(&terminal) as Arc<dyn AssetEvents>);
        let (request, pending) = request_with(rt, options);
        (request, pending, terminal)
    }

    #[test]
    fn model_without_textures_fires_immediately() {
        let rt = runtime();
        let (request, pending, terminal) = tracked(&rt);
        request.begin_import();
        request.on_model_loaded(&Arc::clone(request.model_root()));

        assert_eq!(terminal.fired.load(Ordering::SeqCst), 1);
        assert_eq!(request.state(), RequestState::Resolved);
        let done = pending.try_recv().unwrap();
        assert_eq!(done.file_name, "models/ship.gltf");
        assert!(done.errors.is_none());
        assert_eq!(done.model.unwrap().name(), "ship.gltf");
    }

    #[test]
    fn waits_for_outstanding_textures() {
        let rt = runtime();
        let (request, pending, terminal) = tracked(&rt);
        for f in ["a.png", "b.png", "c.png"] {
            assert!(request.begin_texture(f));
        }
        request.on_model_loaded(&Arc::clone(request.model_root()));
        assert_eq!(request.state(), RequestState::WaitingTextures);

        request.on_texture_loaded(&Texture::default(), "a.png");
        request.on_texture_error("mem/b.png: bad", "b.png");
        assert_eq!(terminal.fired.load(Ordering::SeqCst), 0);
        assert!(pending.try_recv().is_none());

        request.on_texture_loaded(&Texture::default(), "c.png");
        assert_eq!(terminal.fired.load(Ordering::SeqCst), 1);
        assert_eq!(terminal.model_present.load(Ordering::SeqCst), 1);
        assert_eq!(terminal.last_errors.lock().as_deref(), Some("mem/b.png: bad"));
        assert_eq!(request.outstanding_textures(), 0);
    }

    #[test]
    fn textures_finishing_before_model_defer_to_model() {
        let rt = runtime();
        let (request, _pending, terminal) = tracked(&rt);
        assert!(request.begin_texture("a.png"));
        request.on_texture_loaded(&Texture::default(), "a.png");
        assert_eq!(terminal.fired.load(Ordering::SeqCst), 0);

        request.on_model_loaded(&Arc::clone(request.model_root()));
        assert_eq!(terminal.fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extra_resolution_is_ignored() {
        let rt = runtime();
        let (request, _pending, terminal) = tracked(&rt);
        request.on_model_loaded(&Arc::clone(request.model_root()));
        request.on_texture_loaded(&Texture::default(), "stray.png");
        request.on_texture_error("late", "stray.png");
        assert_eq!(request.outstanding_textures(), 0);
        assert_eq!(terminal.fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn model_error_fires_once_without_model() {
        let rt = runtime();
        let (request, pending, terminal) = tracked(&rt);
        assert!(request.begin_texture("a.png"));
        request.on_model_error("parse error at line 3");

        assert_eq!(terminal.fired.load(Ordering::SeqCst), 1);
        assert_eq!(terminal.model_present.load(Ordering::SeqCst), 0);
        assert_eq!(request.state(), RequestState::ImportFailed);
        assert!(!request.begin_texture("b.png"));

        request.on_texture_loaded(&Texture::default(), "a.png");
        request.on_model_error("again");
        assert_eq!(terminal.fired.load(Ordering::SeqCst), 1);

        let done = pending.wait().unwrap();
        assert!(done.model.is_none());
        assert_eq!(done.errors.as_deref(), Some("parse error at line 3"));
    }

    #[test]
    fn thousand_textures_resolved_in_random_order() {
        const TEXTURES: usize = 1000;
        const THREADS: usize = 8;
        let rt = runtime();
        let (request, pending, terminal) = tracked(&rt);

        let start = Arc::new(Barrier::new(THREADS + 1));
        let resolve = Arc::new(Barrier::new(THREADS + 1));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let request = Arc::clone(&request);
                let start = Arc::clone(&start);
                let resolve = Arc::clone(&resolve);
                std::thread::spawn(move || {
                    start.wait();
                    let mut mine: Vec<usize> = (t..TEXTURES).step_by(THREADS).collect();
                    for i in &mine {
                        assert!(request.begin_texture(&format!("{i}.png")));
                    }
                    resolve.wait();
                    mine.shuffle(&mut rand::thread_rng());
                    for i in mine {
                        let file = format!("{i}.png");
                        if i % 7 == 0 {
                            request.on_texture_error(&format!("mem/{file}: decode failed"), &file);
                        } else {
                            request.on_texture_loaded(&Texture::default(), &file);
                        }
                    }
                })
            })
            .collect();

        start.wait();
        resolve.wait();
        request.on_model_loaded(&Arc::clone(request.model_root()));
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(terminal.fired.load(Ordering::SeqCst), 1);
        assert_eq!(request.outstanding_textures(), 0);
        let done = pending.wait().unwrap();
        let errors = done.errors.unwrap();
        assert_eq!(errors.lines().count(), (0..TEXTURES).filter(|i| i % 7 == 0).count());
    }

    #[test]
    fn attaches_to_scene_and_replaces_camera() {
        let rt = runtime();
        let scene = Scene::new("main");
        let old = SceneNode::new("old");
        scene.add_node(Arc::clone(&old));
        let (request, _pending) = request_with(&rt, LoadOptions::new().scene(Arc::clone(&scene)).replace_scene(true));

        let root = Arc::clone(request.model_root());
        let camera = SceneNode::new(MAIN_CAMERA_NODE);
        camera.set_transform(Transform::from_position(Vec3::new(0.0, 1.5, 4.0)));
        camera.set_camera(vrf_core::CameraParams {
            near: 0.5,
            far: 250.0,
            rig_type: vrf_core::CameraRigType::YawOnly,
        });
        root.add_child(camera);
        request.on_model_loaded(&root);

        let nodes = scene.nodes();
        assert_eq!(nodes.len(), 1);
        assert!(Arc::ptr_eq(&nodes[0], &root));
        assert!(old.parent().is_none());
        let rig = scene.camera_rig();
        assert_eq!(rig.transform.position, Vec3::new(0.0, 1.5, 4.0));
        assert_eq!((rig.near, rig.far), (0.5, 250.0));
        assert_eq!(rig.rig_type, vrf_core::CameraRigType::YawOnly);
    }

    #[test]
    fn autostart_animator_runs_after_load() {
        let rt = runtime();
        let (request, _pending) = request_with(&rt, LoadOptions::new());
        let root = Arc::clone(request.model_root());
        let animator = Arc::new(vrf_core::Animator::new(vec![], true));
        root.set_animator(Arc::clone(&animator));
        request.on_model_loaded(&root);
        assert!(animator.is_running());
    }
}
