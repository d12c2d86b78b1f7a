use serde::{Deserialize, Serialize};

/// When the eye render targets are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConstructionPolicy {
    /// On first access of each target.
    #[default]
    Lazy,
    /// All targets of the active eye category when the bundle is created.
    Eager,
}

/// Eye buffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Requested MSAA sample count. Clamped to what the device supports.
    pub multisamples: i32,
    /// Render both eyes in one pass when the device supports it.
    pub multiview: bool,
    pub policy: ConstructionPolicy,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            multisamples: 2,
            multiview: false,
            policy: ConstructionPolicy::Lazy,
        }
    }
}

/// Effective sample count for `requested` on a device supporting up to
/// `device_max`. 0 means no multisampling; a request of 0 or 1 yields 0.
pub fn clamp_sample_count(requested: i32, device_max: u32) -> u32 {
    if requested <= 1 || device_max <= 1 {
        return 0;
    }
    (requested as u32).min(device_max)
}
