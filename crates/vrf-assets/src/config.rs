use serde::{Deserialize, Serialize};

/// Flags passed to the model importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Start the model's animator once the asset has fully loaded.
    pub start_animations: bool,
    /// Skip every texture reference.
    pub no_textures: bool,
    /// Skip animation clips.
    pub no_animation: bool,
    /// Flip the V texture coordinate.
    pub flip_uv: bool,
}

impl ImportSettings {
    /// Settings used when a load does not specify its own.
    pub fn recommended() -> Self {
        Self::default()
    }
}

/// Asset loader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Async runtime worker threads.
    pub worker_threads: usize,
    /// Upper bound on concurrent decode and import jobs.
    pub decode_threads: usize,
    /// Cache decoded textures and file contents across loads.
    pub cache_enabled: bool,
    pub import: ImportSettings,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            decode_threads: 4,
            cache_enabled: true,
            import: ImportSettings::recommended(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loader_config() {
        let config = LoaderConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.import, ImportSettings::recommended());
        assert!(config.decode_threads > 0);
    }
}
