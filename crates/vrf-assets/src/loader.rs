use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use vrf_core::{AssetEvents, EventManager, Scene, SceneNode, Texture, TextureParameters};

use crate::cache::AssetCaches;
use crate::config::{ImportSettings, LoaderConfig};
use crate::context::LoadContext;
use crate::error::AssetError;
use crate::import::{self, GltfLibrary, ImporterKind, SceneImportLibrary, X3dLibrary};
use crate::request::{AssetRequest, PendingAsset, RequestState};
use crate::texture_request::{TextureCallback, TextureRequest};
use crate::upload::UploadQueue;
use crate::volume::{FileVolume, ResourceVolume};

/// Per-load options for a model.
#[derive(Clone, Default)]
pub struct LoadOptions {
    pub(crate) scene: Option<Arc<Scene>>,
    pub(crate) replace_scene: bool,
    pub(crate) handler: Option<Arc<dyn AssetEvents>>,
    pub(crate) settings: Option<ImportSettings>,
    pub(crate) cache_enabled: Option<bool>,
    pub(crate) texture_parameters: TextureParameters,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the model to `scene` once it has fully loaded.
    pub fn scene(mut self, scene: Arc<Scene>) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Clear the scene first and take its camera rig from the model's
    /// `MainCamera` node.
    pub fn replace_scene(mut self, replace: bool) -> Self {
        self.replace_scene = replace;
        self
    }

    /// Receives this load's events before the broadcast manager does.
    pub fn handler(mut self, handler: Arc<dyn AssetEvents>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn settings(mut self, settings: ImportSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    pub fn texture_parameters(mut self, parameters: TextureParameters) -> Self {
        self.texture_parameters = parameters;
        self
    }
}

/// Options for a stand-alone texture load.
#[derive(Clone, Default)]
pub struct TextureOptions {
    parameters: TextureParameters,
    callback: Option<Arc<dyn TextureCallback>>,
    cache_enabled: Option<bool>,
}

impl TextureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parameters(mut self, parameters: TextureParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn TextureCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }
}

/// A model load in progress: the root node exists immediately, its contents
/// arrive as import and texture loading proceed.
pub struct ModelLoad {
    pub model: Arc<SceneNode>,
    pub pending: PendingAsset,
}

/// Loads models and textures on a background runtime.
pub struct AssetLoader {
    runtime: tokio::runtime::Runtime,
    context: Arc<LoadContext>,
    importers: HashMap<ImporterKind, Arc<dyn SceneImportLibrary>>,
    config: LoaderConfig,
}

impl AssetLoader {
    /// Create a loader backed by the process-wide caches and event broadcast.
    pub fn new(config: LoaderConfig) -> Result<Self, AssetError> {
        Self::with_shared(config, AssetCaches::global(), EventManager::global())
    }

    /// A loader with its own caches and its own event broadcast.
    pub fn with_caches(config: LoaderConfig, caches: Arc<AssetCaches>) -> Result<Self, AssetError> {
        Self::with_shared(config, caches, Arc::new(EventManager::new()))
    }

    pub fn with_shared(
        config: LoaderConfig,
        caches: Arc<AssetCaches>,
        events: Arc<EventManager>,
    ) -> Result<Self, AssetError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(config.decode_threads.max(1))
            .thread_name("vrf-assets")
            .enable_all()
            .build()
            .map_err(|e| AssetError::Runtime(format!("Failed to create runtime: {}", e)))?;

        let context = Arc::new(LoadContext::new(
            runtime.handle().clone(),
            caches,
            events,
            Arc::new(UploadQueue::new()),
        ));

        let mut importers: HashMap<ImporterKind, Arc<dyn SceneImportLibrary>> = HashMap::new();
        importers.insert(ImporterKind::Generic, Arc::new(GltfLibrary));
        importers.insert(ImporterKind::Markup, Arc::new(X3dLibrary));

        info!(
            "AssetLoader created ({} workers, {} decode threads, cache {})",
            config.worker_threads, config.decode_threads, config.cache_enabled
        );
        Ok(Self {
            runtime,
            context,
            importers,
            config,
        })
    }

    /// Replace the importer used for `kind`.
    pub fn with_importer(mut self, kind: ImporterKind, library: Arc<dyn SceneImportLibrary>) -> Self {
        self.importers.insert(kind, library);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Process-wide broadcast of every asset event.
    pub fn events(&self) -> &Arc<EventManager> {
        self.context.events()
    }

    /// Textures waiting for the render thread to upload them.
    pub fn uploads(&self) -> &Arc<UploadQueue> {
        self.context.uploads()
    }

    pub fn caches(&self) -> &Arc<AssetCaches> {
        self.context.caches()
    }

    fn importer(&self, file: &str) -> Result<Arc<dyn SceneImportLibrary>, AssetError> {
        let kind = ImporterKind::for_file(file);
        self.importers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AssetError::Import(file.to_string(), format!("no importer for {kind:?}")))
    }

    fn request(&self, volume: Arc<dyn ResourceVolume>, options: LoadOptions) -> (Arc<AssetRequest>, PendingAsset) {
        AssetRequest::new(Arc::clone(&self.context), volume, options, &self.config)
    }

    /// Import the model on the calling thread. Textures keep loading in the
    /// background; `pending` completes once they have all resolved.
    pub fn load_model(&self, volume: Arc<dyn ResourceVolume>, options: LoadOptions) -> Result<ModelLoad, AssetError> {
        let (request, pending) = self.request(volume, options);
        let library = match self.importer(request.file_name()) {
            Ok(library) => library,
            Err(e) => {
                request.on_model_error(&e.to_string());
                return Err(e);
            }
        };
        let model = import::import_model(library.as_ref(), &request)?;
        Ok(ModelLoad { model, pending })
    }

    /// Load a model from a filesystem path.
    pub fn load_model_from_path(&self, path: impl AsRef<Path>, options: LoadOptions) -> Result<ModelLoad, AssetError> {
        self.load_model(Arc::new(FileVolume::new(path)), options)
    }

    /// Replace the contents of `scene` with the model.
    pub fn load_scene(
        &self,
        volume: Arc<dyn ResourceVolume>,
        scene: Arc<Scene>,
        handler: Option<Arc<dyn AssetEvents>>,
    ) -> Result<ModelLoad, AssetError> {
        let mut options = LoadOptions::new().scene(scene).replace_scene(true);
        options.handler = handler;
        self.load_model(volume, options)
    }

    /// Import on the loader runtime. Returns the empty model root at once.
    pub fn load_model_async(&self, volume: Arc<dyn ResourceVolume>, options: LoadOptions) -> ModelLoad {
        let (request, pending) = self.request(volume, options);
        let model = Arc::clone(request.model_root());
        let library = self.importer(request.file_name());
        self.runtime.spawn_blocking(move || {
            let result = library.and_then(|library| import::import_model(library.as_ref(), &request));
            if let Err(e) = result {
                if request.state() != RequestState::ImportFailed {
                    request.on_model_error(&e.to_string());
                }
                warn!("Async load of {} failed: {}", request.file_name(), e);
            }
        });
        ModelLoad { model, pending }
    }

    /// Load one texture. The returned handle is filled in when decoding
    /// finishes; events go to the callback and the broadcast manager.
    pub fn load_texture(&self, volume: &dyn ResourceVolume, path: &str, options: TextureOptions) -> Texture {
        let texture = Texture::new(options.parameters);
        let cache = options.cache_enabled.unwrap_or(self.config.cache_enabled);
        let request = TextureRequest::new(Arc::clone(&self.context), texture.clone(), path, options.callback);
        match volume.open_resource(path) {
            Ok(resource) => self.context.load_texture(request, resource, cache),
            Err(e) => request.failed(e),
        }
        texture
    }

    /// Load a texture from a filesystem path.
    pub fn load_texture_from_path(&self, path: impl AsRef<Path>, options: TextureOptions) -> Texture {
        let volume = FileVolume::new(path);
        let file = volume.file_name().to_string();
        self.load_texture(&volume, &file, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use vrf_core::{Color, Image, TextureSlot, Vec3};

    use crate::decode::encode_png;
    use crate::import::gltf_loader::tests::sample_gltf;
    use crate::import::{FileIo, ParsedMaterial, ParsedMesh, ParsedNode, ParsedScene, TextureRef};
    use crate::volume::MemoryVolume;

    const WAIT: Duration = Duration::from_secs(10);

    fn loader() -> AssetLoader {
        AssetLoader::with_caches(LoaderConfig::default(), Arc::new(AssetCaches::new())).unwrap()
    }

    /// Produces one mesh per texture path, each with its own material.
    struct TexturedLibrary {
        textures: Vec<&'static str>,
    }

    impl SceneImportLibrary for TexturedLibrary {
        fn name(&self) -> &'static str {
            "textured"
        }

        fn import_file(&self, path: &str, _: &ImportSettings, io: &dyn FileIo) -> Result<Option<ParsedScene>, AssetError> {
            io.read(path)?;
            let mut parsed = ParsedScene::new(path);
            for (i, texture) in self.textures.iter().enumerate() {
                parsed.materials.push(ParsedMaterial {
                    name: format!("m{i}"),
                    diffuse: Color::WHITE,
                    textures: vec![TextureRef {
                        slot: TextureSlot::Diffuse,
                        path: texture.to_string(),
                    }],
                });
                parsed.meshes.push(ParsedMesh {
                    name: format!("mesh{i}"),
                    positions: vec![[0.0; 3]; 3],
                    material: Some(i),
                    ..Default::default()
                });
                parsed.add_node(
                    0,
                    ParsedNode {
                        name: format!("part{i}"),
                        meshes: vec![i],
                        ..Default::default()
                    },
                );
            }
            Ok(Some(parsed))
        }
    }

    struct EmptyLibrary;

    impl SceneImportLibrary for EmptyLibrary {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn import_file(&self, _: &str, _: &ImportSettings, _: &dyn FileIo) -> Result<Option<ParsedScene>, AssetError> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct Log {
        events: Mutex<Vec<String>>,
    }

    impl AssetEvents for Log {
        fn on_model_loaded(&self, _: &Arc<SceneNode>, file: &str) {
            self.events.lock().push(format!("model:{file}"));
        }
        fn on_texture_loaded(&self, _: &Texture, file: &str) {
            self.events.lock().push(format!("texture:{file}"));
        }
        fn on_texture_error(&self, _: &str, file: &str) {
            self.events.lock().push(format!("texture-error:{file}"));
        }
        fn on_asset_loaded(&self, model: Option<&Arc<SceneNode>>, file: &str, _: Option<&str>) {
            self.events.lock().push(format!("asset:{file}:{}", model.is_some()));
        }
    }

    fn part_texture(model: &Arc<SceneNode>, part: &str) -> Texture {
        model
            .find_by_name(part)
            .and_then(|n| n.material())
            .and_then(|m| m.texture(TextureSlot::Diffuse).cloned())
            .unwrap()
    }

    #[test]
    fn two_good_textures_and_one_missing() {
        let loader = loader().with_importer(
            ImporterKind::Generic,
            Arc::new(TexturedLibrary {
                textures: vec!["a.png", "b.png", "missing.png"],
            }),
        );
        let volume = MemoryVolume::new("mem", "robot.obj")
            .with_file("robot.obj", "model")
            .with_file("a.png", encode_png(2, 2, [255, 0, 0, 255]))
            .with_file("b.png", encode_png(2, 2, [0, 255, 0, 255]));
        let log = Arc::new(Log::default());
        let broadcast = Arc::new(Log::default());
        loader.events().subscribe(Arc::clone(&broadcast) as Arc<dyn AssetEvents>);

        let load = loader
            .load_model(Arc::new(volume), LoadOptions::new().handler(Arc::clone(&log) as Arc<dyn AssetEvents>))
            .unwrap();
        let done = load.pending.wait_timeout(WAIT).unwrap();

        let model = done.model.unwrap();
        assert!(Arc::ptr_eq(&model, &load.model));
        let errors = done.errors.unwrap();
        assert_eq!(errors.lines().count(), 1);
        assert!(errors.contains("mem/missing.png"));

        assert_eq!(part_texture(&model, "part0").image().unwrap().pixel(0, 0), Some([255, 0, 0, 255]));
        let placeholder = part_texture(&model, "part2").image().unwrap();
        assert_eq!((placeholder.width, placeholder.height), (32, 32));
        assert!(Arc::ptr_eq(&placeholder, &loader.caches().default_image()));

        let events = log.events.lock().clone();
        assert_eq!(events.iter().filter(|e| e.starts_with("asset:")).count(), 1);
        assert_eq!(events.last().unwrap(), "asset:robot.obj:true");
        assert!(events.contains(&"texture-error:missing.png".to_string()));
        assert_eq!(broadcast.events.lock().len(), events.len());

        // Two decoded, one placeholder.
        assert_eq!(loader.uploads().len(), 3);
    }

    #[test]
    fn importer_without_scene_reports_model_error() {
        let loader = loader().with_importer(ImporterKind::Generic, Arc::new(EmptyLibrary));
        let volume = Arc::new(MemoryVolume::new("mem", "nothing.obj"));
        let load = loader.load_model_async(volume, LoadOptions::new());
        let done = load.pending.wait_timeout(WAIT).unwrap();
        assert!(done.model.is_none());
        assert!(done.errors.unwrap().contains("Cannot load model from path nothing.obj"));
    }

    #[test]
    fn missing_model_file_fails_async_load_once() {
        let loader = loader();
        let log = Arc::new(Log::default());
        let load = loader.load_model_async(
            Arc::new(MemoryVolume::new("mem", "gone.gltf")),
            LoadOptions::new().handler(Arc::clone(&log) as Arc<dyn AssetEvents>),
        );
        let done = load.pending.wait_timeout(WAIT).unwrap();
        assert!(done.model.is_none());
        assert!(done.errors.unwrap().contains("mem/gone.gltf"));
        assert_eq!(*log.events.lock(), vec!["asset:gone.gltf:false".to_string()]);
    }

    #[test]
    fn gltf_scene_replaces_contents_and_camera() {
        let loader = loader();
        let volume = MemoryVolume::new("mem", "models/ship.gltf")
            .with_file("models/ship.gltf", sample_gltf("tex/normal.png"))
            .with_file("models/tex/normal.png", encode_png(4, 4, [128, 128, 255, 255]));
        let scene = Scene::new("main");
        let stale = SceneNode::new("stale");
        scene.add_node(Arc::clone(&stale));

        let load = loader.load_scene(Arc::new(volume), Arc::clone(&scene), None).unwrap();
        let done = load.pending.wait_timeout(WAIT).unwrap();
        assert!(done.errors.is_none(), "{:?}", done.errors);

        let nodes = scene.nodes();
        assert_eq!(nodes.len(), 1);
        assert!(Arc::ptr_eq(&nodes[0], &load.model));
        assert!(stale.parent().is_none());

        let rig = scene.camera_rig();
        assert_eq!(rig.transform.position, Vec3::new(0.0, 1.0, 5.0));
        assert_eq!((rig.near, rig.far), (0.25, 500.0));

        let hull = load.model.find_by_name("hull").unwrap();
        let material = hull.material().unwrap();
        let diffuse = material.texture(TextureSlot::Diffuse).unwrap().image().unwrap();
        assert_eq!(diffuse.pixel(1, 1), Some([200, 10, 10, 255]));
        let normal = material.texture(TextureSlot::Normal).unwrap().image().unwrap();
        assert_eq!(normal.width, 4);
        assert!(loader.caches().embedded.contains(&"mem/models/ship.gltf*0".to_string()));
        assert!(load.model.animator().is_some());
    }

    #[test]
    fn textures_are_shared_through_the_cache() {
        let loader = loader().with_importer(
            ImporterKind::Generic,
            Arc::new(TexturedLibrary {
                textures: vec!["shared.png"],
            }),
        );
        let volume: Arc<dyn ResourceVolume> = Arc::new(
            MemoryVolume::new("mem", "a.obj")
                .with_file("a.obj", "model")
                .with_file("shared.png", encode_png(1, 1, [9, 9, 9, 255])),
        );
        let first = loader.load_model(Arc::clone(&volume), LoadOptions::new()).unwrap();
        first.pending.wait_timeout(WAIT).unwrap();
        let second = loader.load_model(volume, LoadOptions::new()).unwrap();
        second.pending.wait_timeout(WAIT).unwrap();

        let a = part_texture(&first.model, "part0").image().unwrap();
        let b = part_texture(&second.model, "part0").image().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn no_textures_setting_skips_requests() {
        let loader = loader().with_importer(
            ImporterKind::Generic,
            Arc::new(TexturedLibrary {
                textures: vec!["missing.png"],
            }),
        );
        let volume = Arc::new(MemoryVolume::new("mem", "a.obj").with_file("a.obj", "model"));
        let settings = ImportSettings {
            no_textures: true,
            ..ImportSettings::recommended()
        };
        let load = loader.load_model(volume, LoadOptions::new().settings(settings)).unwrap();
        let done = load.pending.try_recv().unwrap();
        assert!(done.errors.is_none());
    }

    struct Watcher {
        wanted: bool,
        loaded: AtomicBool,
        failures: Mutex<Vec<String>>,
    }

    impl TextureCallback for Watcher {
        fn loaded(&self, _: &Texture, _: &Arc<Image>) {
            self.loaded.store(true, Ordering::SeqCst);
        }
        fn failed(&self, error: &AssetError) {
            self.failures.lock().push(error.to_string());
        }
        fn still_wanted(&self) -> bool {
            self.wanted
        }
    }

    #[derive(Default)]
    struct TextureCount(AtomicUsize);

    impl AssetEvents for TextureCount {
        fn on_texture_loaded(&self, _: &Texture, _: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn watcher(wanted: bool) -> Arc<Watcher> {
        Arc::new(Watcher {
            wanted,
            loaded: AtomicBool::new(false),
            failures: Mutex::new(Vec::new()),
        })
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = std::time::Instant::now() + WAIT;
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn direct_texture_load_notifies_callback_and_broadcast() {
        let loader = loader();
        let count = Arc::new(TextureCount::default());
        loader.events().subscribe(Arc::clone(&count) as Arc<dyn AssetEvents>);
        let volume = MemoryVolume::new("mem", "").with_file("logo.png", encode_png(3, 3, [1, 2, 3, 255]));
        let cb = watcher(true);

        let texture = loader.load_texture(&volume, "logo.png", TextureOptions::new().callback(Arc::clone(&cb) as Arc<dyn TextureCallback>));

        assert!(wait_for(|| count.0.load(Ordering::SeqCst) == 1));
        assert!(cb.loaded.load(Ordering::SeqCst));
        assert_eq!(texture.image().unwrap().width, 3);
    }

    #[test]
    fn unwanted_texture_is_abandoned() {
        let loader = loader();
        let volume = MemoryVolume::new("mem", "").with_file("logo.png", encode_png(1, 1, [0; 4]));
        let cb = watcher(false);
        let texture = loader.load_texture(&volume, "logo.png", TextureOptions::new().callback(Arc::clone(&cb) as Arc<dyn TextureCallback>));

        let failures = cb.failures.lock().clone();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("abandoned"));
        assert!(texture.image().is_none());
        assert!(!cb.loaded.load(Ordering::SeqCst));
    }

    #[test]
    fn default_loaders_share_the_global_broadcast() {
        let a = AssetLoader::new(LoaderConfig::default()).unwrap();
        let b = AssetLoader::new(LoaderConfig::default()).unwrap();
        assert!(Arc::ptr_eq(a.events(), b.events()));
        assert!(Arc::ptr_eq(a.events(), &EventManager::global()));
        assert!(!Arc::ptr_eq(loader().events(), a.events()));
    }

    #[test]
    fn loads_model_and_texture_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tex")).unwrap();
        std::fs::write(dir.path().join("ship.gltf"), sample_gltf("tex/normal.png")).unwrap();
        std::fs::write(dir.path().join("tex/normal.png"), encode_png(4, 4, [128, 128, 255, 255])).unwrap();

        let loader = loader();
        let load = loader
            .load_model_from_path(dir.path().join("ship.gltf"), LoadOptions::new())
            .unwrap();
        let done = load.pending.wait_timeout(WAIT).unwrap();
        assert!(done.errors.is_none(), "{:?}", done.errors);
        assert!(load.model.find_by_name("hull").is_some());

        let texture = loader.load_texture_from_path(dir.path().join("tex/normal.png"), TextureOptions::new());
        assert!(wait_for(|| texture.image().is_some()));
        assert_eq!(texture.image().unwrap().width, 4);
    }

    #[test]
    fn direct_texture_missing_file_fails() {
        let loader = loader();
        let volume = MemoryVolume::new("mem", "");
        let cb = watcher(true);
        loader.load_texture(&volume, "nope.png", TextureOptions::new().callback(Arc::clone(&cb) as Arc<dyn TextureCallback>));
        assert!(cb.failures.lock()[0].contains("mem/nope.png"));
    }
}
