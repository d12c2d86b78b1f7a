//! Scene graph nodes, scenes and camera rigs.
//!
//! Nodes are shared (`Arc<SceneNode>`) and internally locked so that a model
//! can be populated on a loader worker while the application holds its root.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::material::Material;
use crate::mesh::Mesh;
use crate::types::{Color, Transform};

/// Camera settings carried by a camera node in an imported model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub near: f32,
    pub far: f32,
    pub rig_type: CameraRigType,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 1000.0,
            rig_type: CameraRigType::Free,
        }
    }
}

/// A named animation clip.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// Duration in seconds
    pub duration: f32,
}

/// Animation playback state attached to a model root.
#[derive(Debug)]
pub struct Animator {
    pub clips: Vec<AnimationClip>,
    /// Start automatically once the owning asset has fully loaded.
    pub auto_start: bool,
    running: AtomicBool,
}

impl Animator {
    pub fn new(clips: Vec<AnimationClip>, auto_start: bool) -> Self {
        Self {
            clips,
            auto_start,
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// A node in the scene graph.
pub struct SceneNode {
    name: RwLock<String>,
    transform: RwLock<Transform>,
    mesh: RwLock<Option<Arc<Mesh>>>,
    material: RwLock<Option<Arc<Material>>>,
    camera: RwLock<Option<CameraParams>>,
    animator: RwLock<Option<Arc<Animator>>>,
    parent: RwLock<Weak<SceneNode>>,
    children: RwLock<Vec<Arc<SceneNode>>>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: RwLock::new(name.into()),
            transform: RwLock::new(Transform::default()),
            mesh: RwLock::new(None),
            material: RwLock::new(None),
            camera: RwLock::new(None),
            animator: RwLock::new(None),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
        })
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn transform(&self) -> Transform {
        *self.transform.read()
    }

    pub fn set_transform(&self, transform: Transform) {
        *self.transform.write() = transform;
    }

    pub fn mesh(&self) -> Option<Arc<Mesh>> {
        self.mesh.read().clone()
    }

    pub fn set_mesh(&self, mesh: Arc<Mesh>) {
        *self.mesh.write() = Some(mesh);
    }

    pub fn material(&self) -> Option<Arc<Material>> {
        self.material.read().clone()
    }

    pub fn set_material(&self, material: Arc<Material>) {
        *self.material.write() = Some(material);
    }

    pub fn camera(&self) -> Option<CameraParams> {
        *self.camera.read()
    }

    pub fn set_camera(&self, camera: CameraParams) {
        *self.camera.write() = Some(camera);
    }

    pub fn animator(&self) -> Option<Arc<Animator>> {
        self.animator.read().clone()
    }

    pub fn set_animator(&self, animator: Arc<Animator>) {
        *self.animator.write() = Some(animator);
    }

    pub fn parent(&self) -> Option<Arc<SceneNode>> {
        self.parent.read().upgrade()
    }

    pub fn children(&self) -> Vec<Arc<SceneNode>> {
        self.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }

    /// Attach `child` under this node, detaching it from any previous parent.
    pub fn add_child(self: &Arc<Self>, child: Arc<SceneNode>) {
        if Arc::ptr_eq(self, &child) {
            return;
        }
        if let Some(old) = child.parent() {
            old.remove_child(&child);
        }
        *child.parent.write() = Arc::downgrade(self);
        self.children.write().push(child);
    }

    /// Detach `child`. Returns false if it was not a child of this node.
    pub fn remove_child(&self, child: &Arc<SceneNode>) -> bool {
        let mut children = self.children.write();
        let before = children.len();
        children.retain(|c| !Arc::ptr_eq(c, child));
        let removed = children.len() != before;
        if removed {
            *child.parent.write() = Weak::new();
        }
        removed
    }

    /// Detach every child.
    pub fn clear_children(&self) {
        let children = std::mem::take(&mut *self.children.write());
        for child in children {
            *child.parent.write() = Weak::new();
        }
    }

    /// This node and all descendants, depth first.
    pub fn descendants(self: &Arc<Self>) -> Vec<Arc<SceneNode>> {
        let mut out = Vec::new();
        let mut stack = vec![Arc::clone(self)];
        while let Some(node) = stack.pop() {
            let children = node.children();
            stack.extend(children.into_iter().rev());
            out.push(node);
        }
        out
    }

    /// First node named `name` in this subtree, including this node.
    pub fn find_by_name(self: &Arc<Self>, name: &str) -> Option<Arc<SceneNode>> {
        self.descendants().into_iter().find(|n| *n.name.read() == name)
    }
}

impl std::fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneNode")
            .field("name", &*self.name.read())
            .field("children", &self.child_count())
            .finish_non_exhaustive()
    }
}

/// A viewpoint used by a render target.
#[derive(Debug)]
pub struct Camera {
    pub label: String,
    pub background: Color,
}

impl Camera {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            background: Color::BLACK,
        })
    }
}

/// How head tracking drives the camera rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraRigType {
    #[default]
    Free,
    YawOnly,
    RollFreeze,
    Freeze,
    Orbit,
}

/// The stereo camera triple of a scene.
#[derive(Debug, Clone)]
pub struct CameraRig {
    pub left: Arc<Camera>,
    pub right: Arc<Camera>,
    pub center: Arc<Camera>,
    pub transform: Transform,
    pub near: f32,
    pub far: f32,
    pub rig_type: CameraRigType,
}

impl Default for CameraRig {
    fn default() -> Self {
        let params = CameraParams::default();
        Self {
            left: Camera::new("left"),
            right: Camera::new("right"),
            center: Camera::new("center"),
            transform: Transform::default(),
            near: params.near,
            far: params.far,
            rig_type: params.rig_type,
        }
    }
}

/// A scene: a root node plus its main camera rig.
#[derive(Debug)]
pub struct Scene {
    name: String,
    root: Arc<SceneNode>,
    camera_rig: RwLock<CameraRig>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            root: SceneNode::new(format!("{name}::root")),
            name,
            camera_rig: RwLock::new(CameraRig::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Arc<SceneNode> {
        &self.root
    }

    pub fn add_node(&self, node: Arc<SceneNode>) {
        self.root.add_child(node);
    }

    pub fn remove_node(&self, node: &Arc<SceneNode>) -> bool {
        self.root.remove_child(node)
    }

    /// Remove every top-level node.
    pub fn clear(&self) {
        self.root.clear_children();
    }

    /// Nodes directly under the scene root.
    pub fn nodes(&self) -> Vec<Arc<SceneNode>> {
        self.root.children()
    }

    pub fn camera_rig(&self) -> CameraRig {
        self.camera_rig.read().clone()
    }

    pub fn update_camera_rig(&self, f: impl FnOnce(&mut CameraRig)) {
        f(&mut self.camera_rig.write());
    }
}
