//! vrf Core - Scene, texture and event types for the vrf engine
//!
//! This crate holds the data shared by the asset loader and the renderer:
//! - Scene graph nodes, scenes and camera rigs
//! - Meshes and materials produced by model import
//! - Texture handles and decoded images
//! - Asset event fan-out (user handler + process-wide broadcast)
//! - Restart hooks for process-scoped state

pub mod events;
pub mod lifecycle;
pub mod material;
pub mod mesh;
pub mod scene;
pub mod texture;
pub mod types;

pub use events::{AssetEvents, EventDispatch, EventManager, SubscriptionId};
pub use material::{Material, TextureSlot};
pub use mesh::Mesh;
pub use scene::{AnimationClip, Animator, Camera, CameraParams, CameraRig, CameraRigType, Scene, SceneNode};
pub use texture::{GpuTextureUploader, Image, Texture, TextureFilter, TextureId, TextureParameters, TextureWrap, UploadError};
pub use types::{Color, Transform};

pub use glam::{Mat4, Quat, Vec2, Vec3};
