/// Errors that can occur during asset loading.
///
/// Paths are resource identities (`volume/relative-path`) so that every
/// message names the file it refers to.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("I/O error loading '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("failed to import model '{0}': {1}")]
    Import(String, String),

    #[error("failed to decode texture '{0}': {1}")]
    TextureDecode(String, String),

    #[error("unsupported image format in '{0}'")]
    UnsupportedFormat(String),

    #[error("texture request for '{0}' was abandoned")]
    Abandoned(String),

    #[error("loader runtime error: {0}")]
    Runtime(String),
}

impl AssetError {
    /// IO and import failures abort a whole model load; texture failures do not.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Io(..) | Self::Import(..) | Self::Runtime(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_errors_are_not_fatal() {
        assert!(!AssetError::TextureDecode("a".into(), "bad".into()).is_fatal());
        assert!(!AssetError::UnsupportedFormat("a".into()).is_fatal());
        assert!(AssetError::Import("m".into(), "bad".into()).is_fatal());
        assert!(AssetError::NotFound("m".into()).is_fatal());
    }

    #[test]
    fn messages_name_the_resource() {
        let err = AssetError::NotFound("assets/tex/brick.png".into());
        assert!(err.to_string().contains("assets/tex/brick.png"));
    }
}
