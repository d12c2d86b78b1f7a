use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;
use vrf_core::Material;

/// Identifier of a generated material shader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// Assigns one shader variant per distinct set of bound texture slots.
///
/// Materials with the same slots share a variant regardless of which images
/// they bind. Ids are stable for the life of the manager.
#[derive(Debug, Default)]
pub struct MaterialShaderManager {
    variants: Mutex<HashMap<String, ShaderId>>,
}

impl MaterialShaderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variant key of a material: its slot uniform names, sorted, comma separated.
    pub fn signature(material: &Material) -> String {
        let mut slots: Vec<_> = material.textures.iter().map(|(slot, _)| *slot).collect();
        slots.sort();
        slots.dedup();
        slots
            .iter()
            .map(|slot| slot.shader_var())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn shader_for(&self, material: &Material) -> ShaderId {
        self.shader_for_signature(&Self::signature(material))
    }

    pub fn shader_for_signature(&self, signature: &str) -> ShaderId {
        let mut variants = self.variants.lock();
        if let Some(id) = variants.get(signature) {
            return *id;
        }
        let id = ShaderId(variants.len() as u32);
        debug!("New material shader {:?} for [{}]", id, signature);
        variants.insert(signature.to_string(), id);
        id
    }

    pub fn len(&self) -> usize {
        self.variants.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
