use crate::texture::Texture;
use crate::types::Color;

/// Role of a texture within a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureSlot {
    Diffuse,
    Specular,
    Normal,
    Emissive,
    Occlusion,
    Opacity,
}

impl TextureSlot {
    /// Shader uniform name the slot binds to.
    pub fn shader_var(&self) -> &'static str {
        match self {
            Self::Diffuse => "diffuseTexture",
            Self::Specular => "specularTexture",
            Self::Normal => "normalTexture",
            Self::Emissive => "emissiveTexture",
            Self::Occlusion => "ambientTexture",
            Self::Opacity => "opacityTexture",
        }
    }
}

/// Surface description attached to a scene node.
#[derive(Debug, Clone, Default)]
pub struct Material {
    pub name: String,
    pub diffuse: Color,
    pub textures: Vec<(TextureSlot, Texture)>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Texture bound to `slot`, if any.
    pub fn texture(&self, slot: TextureSlot) -> Option<&Texture> {
        self.textures
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, t)| t)
    }

    /// Bind `texture` to `slot`, replacing any previous binding.
    pub fn set_texture(&mut self, slot: TextureSlot, texture: Texture) {
        self.textures.retain(|(s, _)| *s != slot);
        self.textures.push((slot, texture));
    }
}
