use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use vrf_core::{Camera, Scene, SceneNode};

use crate::texture::RenderTexture;

/// Which eye a render target renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
    /// Both eyes in one layered pass.
    Multiview,
}

/// Nodes collected by the cull pass, shared between paired targets.
pub type RenderList = Arc<Mutex<Vec<Arc<SceneNode>>>>;

/// A render texture bound to a scene and camera.
///
/// Targets are linked into a ring through [`RenderTarget::next`]. The link is
/// weak; the owning bundle keeps the targets alive.
pub struct RenderTarget {
    texture: Arc<RenderTexture>,
    scene: RwLock<Arc<Scene>>,
    camera: RwLock<Option<Arc<Camera>>>,
    next: RwLock<Weak<RenderTarget>>,
    paired_left: Option<Arc<RenderTarget>>,
    render_list: RenderList,
    multiview: bool,
}

impl RenderTarget {
    pub fn new(texture: Arc<RenderTexture>, scene: Arc<Scene>) -> Arc<Self> {
        Self::build(texture, scene, None, RenderList::default(), false)
    }

    pub fn new_multiview(texture: Arc<RenderTexture>, scene: Arc<Scene>) -> Arc<Self> {
        Self::build(texture, scene, None, RenderList::default(), true)
    }

    /// A right eye target. It reuses the render list of `left`, so the scene
    /// is culled once per stereo pair.
    pub fn new_paired(texture: Arc<RenderTexture>, scene: Arc<Scene>, left: &Arc<RenderTarget>) -> Arc<Self> {
        Self::build(
            texture,
            scene,
            Some(Arc::clone(left)),
            Arc::clone(&left.render_list),
            false,
        )
    }

    /// A target that renders from the list culled by `source`.
    pub fn sharing_render_list(texture: Arc<RenderTexture>, scene: Arc<Scene>, source: &RenderTarget) -> Arc<Self> {
        Self::build(texture, scene, None, Arc::clone(&source.render_list), false)
    }

    fn build(
        texture: Arc<RenderTexture>,
        scene: Arc<Scene>,
        paired_left: Option<Arc<RenderTarget>>,
        render_list: RenderList,
        multiview: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            texture,
            scene: RwLock::new(scene),
            camera: RwLock::new(None),
            next: RwLock::new(Weak::new()),
            paired_left,
            render_list,
            multiview,
        })
    }

    pub fn texture(&self) -> &Arc<RenderTexture> {
        &self.texture
    }

    pub fn scene(&self) -> Arc<Scene> {
        Arc::clone(&self.scene.read())
    }

    pub fn set_scene(&self, scene: Arc<Scene>) {
        *self.scene.write() = scene;
    }

    pub fn camera(&self) -> Option<Arc<Camera>> {
        self.camera.read().clone()
    }

    pub fn set_camera(&self, camera: Arc<Camera>) {
        *self.camera.write() = Some(camera);
    }

    /// The target rendered after this one.
    pub fn next(&self) -> Option<Arc<RenderTarget>> {
        self.next.read().upgrade()
    }

    pub fn attach_render_target(&self, next: &Arc<RenderTarget>) {
        *self.next.write() = Arc::downgrade(next);
    }

    /// Left eye target this right eye target is paired with.
    pub fn paired_left(&self) -> Option<&Arc<RenderTarget>> {
        self.paired_left.as_ref()
    }

    pub fn is_multiview(&self) -> bool {
        self.multiview
    }

    pub fn shares_render_list(&self, other: &RenderTarget) -> bool {
        Arc::ptr_eq(&self.render_list, &other.render_list)
    }

    /// Snapshot of the last cull result.
    pub fn render_list(&self) -> Vec<Arc<SceneNode>> {
        self.render_list.lock().clone()
    }

    /// Collect every mesh-carrying node of the current scene into the
    /// render list. Returns the number of nodes collected.
    pub fn cull(&self) -> usize {
        let scene = self.scene();
        let visible: Vec<_> = scene
            .root()
            .descendants()
            .into_iter()
            .filter(|node| node.mesh().is_some())
            .collect();
        let count = visible.len();
        *self.render_list.lock() = visible;
        count
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("texture", &self.texture.id())
            .field("scene", &self.scene.read().name())
            .field("multiview", &self.multiview)
            .field("paired", &self.paired_left.is_some())
            .finish_non_exhaustive()
    }
}
