//! Resource volumes: where a model and its dependent files are read from.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::AssetError;
use crate::identity::ResourceIdentity;

/// An open stream for one resource.
pub struct Resource {
    identity: ResourceIdentity,
    reader: Box<dyn Read + Send>,
}

impl Resource {
    pub fn new(identity: ResourceIdentity, reader: impl Read + Send + 'static) -> Self {
        Self {
            identity,
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(identity: ResourceIdentity, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(identity, Cursor::new(bytes.into()))
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Read the whole stream and close it.
    pub fn read_all(mut self) -> Result<Vec<u8>, AssetError> {
        let mut bytes = Vec::new();
        self.reader
            .read_to_end(&mut bytes)
            .map_err(|e| AssetError::Io(self.identity.to_string(), e))?;
        Ok(bytes)
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource").field("identity", &self.identity).finish_non_exhaustive()
    }
}

/// A source of resources relative to a model file.
pub trait ResourceVolume: Send + Sync {
    /// Name of the volume root, used as the first half of every identity.
    fn root(&self) -> &str;

    /// Path of the model file within the volume.
    fn file_name(&self) -> &str;

    /// Open `path`, relative to the volume root.
    fn open_resource(&self, path: &str) -> Result<Resource, AssetError>;

    fn identity(&self, path: &str) -> ResourceIdentity {
        ResourceIdentity::new(self.root(), path)
    }
}

/// Text after the last `/`.
pub fn base_name(file: &str) -> &str {
    file.rsplit('/').next().unwrap_or(file)
}

/// Text before the last `/`, including it. Empty when there is no directory.
pub fn parent_dir(file: &str) -> &str {
    match file.rfind('/') {
        Some(i) => &file[..=i],
        None => "",
    }
}

/// The last three characters of `file`, lowercased. Format dispatch looks at
/// nothing else.
pub fn format_extension(file: &str) -> String {
    let chars: Vec<char> = file.chars().collect();
    let start = chars.len().saturating_sub(3);
    chars[start..].iter().collect::<String>().to_lowercase()
}

/// Resources on the local filesystem, rooted at the model's directory.
#[derive(Debug, Clone)]
pub struct FileVolume {
    root: PathBuf,
    root_name: String,
    file_name: String,
}

impl FileVolume {
    /// A volume for the model at `model_path`. Dependent files resolve
    /// against the model's directory.
    pub fn new(model_path: impl AsRef<Path>) -> Self {
        let model_path = model_path.as_ref();
        let root = match model_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            root_name: root.to_string_lossy().into_owned(),
            root,
            file_name,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

impl ResourceVolume for FileVolume {
    fn root(&self) -> &str {
        &self.root_name
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn open_resource(&self, path: &str) -> Result<Resource, AssetError> {
        let identity = self.identity(path);
        let file = File::open(self.resolve(path)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(identity.to_string()),
            _ => AssetError::Io(identity.to_string(), e),
        })?;
        Ok(Resource::new(identity, BufReader::new(file)))
    }
}

/// Resources held in memory. Used for bundled assets and tests.
pub struct MemoryVolume {
    root: String,
    file_name: String,
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryVolume {
    pub fn new(root: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_name: file_name.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_file(self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.files.write().insert(path.into(), Arc::from(bytes));
    }
}

impl ResourceVolume for MemoryVolume {
    fn root(&self) -> &str {
        &self.root
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn open_resource(&self, path: &str) -> Result<Resource, AssetError> {
        let identity = self.identity(path);
        let bytes = self
            .files
            .read()
            .get(identity.path())
            .cloned()
            .ok_or_else(|| AssetError::NotFound(identity.to_string()))?;
        Ok(Resource::new(identity, Cursor::new(bytes)))
    }
}
