//! Model import.
//!
//! An importer library parses a file into a [`ParsedScene`]; the builder
//! turns that into scene nodes and dispatches one texture request per
//! texture reference through the owning [`AssetRequest`].

mod builder;
pub mod gltf_loader;
pub mod x3d_loader;

use std::sync::Arc;

use tracing::{debug, info};

use vrf_core::{CameraParams, Color, SceneNode, TextureSlot, Transform};

use crate::cache::AssetCaches;
use crate::config::ImportSettings;
use crate::error::AssetError;
use crate::request::AssetRequest;
use crate::volume::{format_extension, ResourceVolume};

pub use gltf_loader::GltfLibrary;
pub use x3d_loader::X3dLibrary;

/// Pixels of a texture stored inside the model file.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedTexture {
    /// A compressed image file (PNG, JPEG, ...).
    Compressed { bytes: Vec<u8>, format_hint: Option<String> },
    /// Raw ARGB8888 pixels.
    Argb { width: u32, height: u32, pixels: Vec<u32> },
}

/// A material's reference to a texture. Paths of the form `*N` address
/// [`ParsedScene::embedded_textures`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRef {
    pub slot: TextureSlot,
    pub path: String,
}

impl TextureRef {
    /// Index into the embedded texture list, for `*N` paths.
    pub fn embedded_index(&self) -> Option<usize> {
        self.path.strip_prefix('*')?.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMaterial {
    pub name: String,
    pub diffuse: Color,
    pub textures: Vec<TextureRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub indices: Option<Vec<u32>>,
    pub material: Option<usize>,
    pub bones: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedNode {
    pub name: String,
    pub transform: Transform,
    pub meshes: Vec<usize>,
    pub camera: Option<CameraParams>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnimation {
    pub name: String,
    pub duration: f32,
}

/// Importer output. `nodes[0]` is the model root.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScene {
    pub nodes: Vec<ParsedNode>,
    pub meshes: Vec<ParsedMesh>,
    pub materials: Vec<ParsedMaterial>,
    pub embedded_textures: Vec<EmbeddedTexture>,
    pub animations: Vec<ParsedAnimation>,
}

impl ParsedScene {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![ParsedNode {
                name: root_name.into(),
                ..Default::default()
            }],
            meshes: Vec::new(),
            materials: Vec::new(),
            embedded_textures: Vec::new(),
            animations: Vec::new(),
        }
    }

    /// Append `node` under `parent` and return its index.
    pub fn add_node(&mut self, parent: usize, node: ParsedNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(index);
        }
        index
    }

    pub fn texture_refs(&self) -> impl Iterator<Item = &TextureRef> {
        self.materials.iter().flat_map(|m| m.textures.iter())
    }
}

/// File access handed to importer libraries.
pub trait FileIo: Send + Sync {
    fn read(&self, path: &str) -> Result<Arc<Vec<u8>>, AssetError>;
}

/// Reads straight from a volume.
pub struct VolumeIo {
    volume: Arc<dyn ResourceVolume>,
}

impl VolumeIo {
    pub fn new(volume: Arc<dyn ResourceVolume>) -> Self {
        Self { volume }
    }
}

impl FileIo for VolumeIo {
    fn read(&self, path: &str) -> Result<Arc<Vec<u8>>, AssetError> {
        Ok(Arc::new(self.volume.open_resource(path)?.read_all()?))
    }
}

/// Reads from a volume through the process-wide file cache.
pub struct CachedVolumeIo {
    volume: Arc<dyn ResourceVolume>,
    caches: Arc<AssetCaches>,
}

impl CachedVolumeIo {
    pub fn new(volume: Arc<dyn ResourceVolume>, caches: Arc<AssetCaches>) -> Self {
        Self { volume, caches }
    }
}

impl FileIo for CachedVolumeIo {
    fn read(&self, path: &str) -> Result<Arc<Vec<u8>>, AssetError> {
        let identity = self.volume.identity(path);
        if let Some(bytes) = self.caches.bytes.get(&identity) {
            debug!("File cache hit: {}", identity);
            return Ok(bytes);
        }
        let bytes = self.volume.open_resource(path)?.read_all()?;
        Ok(self.caches.bytes.put(identity, Arc::new(bytes)))
    }
}

/// A model importer.
pub trait SceneImportLibrary: Send + Sync {
    fn name(&self) -> &'static str;

    /// Parse the model at `path`. `Ok(None)` means the file held no scene.
    fn import_file(&self, path: &str, settings: &ImportSettings, io: &dyn FileIo)
        -> Result<Option<ParsedScene>, AssetError>;
}

/// Which importer handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImporterKind {
    /// Everything but X3D.
    Generic,
    /// X3D scenes.
    Markup,
}

impl ImporterKind {
    pub fn for_file(path: &str) -> Self {
        if format_extension(path) == "x3d" {
            Self::Markup
        } else {
            Self::Generic
        }
    }
}

/// Import `request`'s model with `library` and build it under the request's
/// model root. Failures are reported through the request before returning.
pub(crate) fn import_model(library: &dyn SceneImportLibrary, request: &Arc<AssetRequest>) -> Result<Arc<SceneNode>, AssetError> {
    request.begin_import();
    let file = request.file_name().to_string();
    info!("Importing {} with {}", file, library.name());

    let io: Box<dyn FileIo> = if request.cache_enabled() {
        Box::new(CachedVolumeIo::new(Arc::clone(request.volume()), Arc::clone(request.context().caches())))
    } else {
        Box::new(VolumeIo::new(Arc::clone(request.volume())))
    };

    let parsed = match library.import_file(&file, request.settings(), io.as_ref()) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => {
            let err = AssetError::Import(file.clone(), format!("Cannot load model from path {file}"));
            request.on_model_error(&err.to_string());
            return Err(err);
        }
        Err(err) => {
            request.on_model_error(&err.to_string());
            return Err(err);
        }
    };

    let root = Arc::clone(request.model_root());
    builder::build_scene(request, &root, &parsed);
    request.on_model_loaded(&root);
    Ok(root)
}
