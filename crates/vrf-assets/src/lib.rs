//! vrf Assets - Asynchronous model and texture loading
//!
//! Imports glTF and X3D models into scene nodes, decodes their textures on a
//! background runtime, and fires one terminal event per model once every
//! texture has resolved. Decoded images and file contents are shared
//! through process-wide caches.

mod cache;
mod config;
mod context;
mod decode;
mod error;
mod identity;
pub mod import;
mod loader;
mod request;
mod texture_request;
mod upload;
mod volume;

pub use cache::{AssetCaches, ByteCache, EmbeddedTextureCache, ResourceCache, TextureCache, DEFAULT_IMAGE_SIZE};
pub use config::{ImportSettings, LoaderConfig};
pub use context::LoadContext;
pub use decode::{decode_image, image_from_argb};
pub use error::AssetError;
pub use identity::ResourceIdentity;
pub use import::{ImporterKind, SceneImportLibrary};
pub use loader::{AssetLoader, LoadOptions, ModelLoad, TextureOptions};
pub use request::{AssetLoaded, AssetRequest, PendingAsset, RequestState, MAIN_CAMERA_NODE};
pub use texture_request::{TextureCallback, TextureRequest};
pub use upload::UploadQueue;
pub use volume::{base_name, format_extension, parent_dir, FileVolume, MemoryVolume, Resource, ResourceVolume};
