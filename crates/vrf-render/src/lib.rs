//! vrf Render - Eye render targets for the vrf engine
//!
//! Holds the triple-buffered render target rings for the left, right and
//! multiview eye passes, the post-effect buffers and the material shader
//! registry. GPU work goes through the [`RenderBackend`] trait.

mod bundle;
mod config;
mod error;
mod shader;
mod target;
mod texture;

pub use bundle::{PostEffect, RenderBundle, BUFFER_COUNT};
pub use config::{clamp_sample_count, ConstructionPolicy, RenderConfig};
pub use error::RenderError;
pub use shader::{MaterialShaderManager, ShaderId};
pub use target::{Eye, RenderList, RenderTarget};
pub use texture::{RenderBackend, RenderTexture, RenderTextureDesc, RenderTextureId};
