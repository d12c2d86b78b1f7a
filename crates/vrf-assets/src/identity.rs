use std::fmt;
use std::sync::Arc;

/// Identity of a resource: the volume it lives in plus its path inside that
/// volume. Equality is by path, never by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    volume: Arc<str>,
    path: Arc<str>,
}

impl ResourceIdentity {
    pub fn new(volume: &str, path: &str) -> Self {
        let path = path.strip_prefix("./").unwrap_or(path);
        Self {
            volume: Arc::from(volume),
            path: Arc::from(path),
        }
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.volume.is_empty() || self.path.starts_with('/') {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}/{}", self.volume.trim_end_matches('/'), self.path)
        }
    }
}
