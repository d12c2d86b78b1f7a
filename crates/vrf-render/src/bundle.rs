use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use vrf_core::{Camera, CameraRig, Scene};

use crate::config::{clamp_sample_count, ConstructionPolicy, RenderConfig};
use crate::error::RenderError;
use crate::shader::MaterialShaderManager;
use crate::target::{Eye, RenderTarget};
use crate::texture::{RenderBackend, RenderTexture, RenderTextureDesc};

/// Pipeline depth of each eye's target ring.
pub const BUFFER_COUNT: usize = 3;

/// One of the two ping-pong post-effect buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostEffect {
    A,
    B,
}

impl PostEffect {
    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

type Ring = [Option<Arc<RenderTarget>>; BUFFER_COUNT];

#[derive(Default)]
struct Targets {
    left: Ring,
    right: Ring,
    multiview: Ring,
    post_effect: [Option<Arc<RenderTexture>>; 2],
    eye_capture: Option<Arc<RenderTarget>>,
    eye_capture_post_effect: [Option<Arc<RenderTexture>>; 2],
}

impl Targets {
    fn ring(&self, eye: Eye) -> &Ring {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
            Eye::Multiview => &self.multiview,
        }
    }

    fn ring_mut(&mut self, eye: Eye) -> &mut Ring {
        match eye {
            Eye::Left => &mut self.left,
            Eye::Right => &mut self.right,
            Eye::Multiview => &mut self.multiview,
        }
    }
}

struct State {
    samples: u32,
    multiview: bool,
    targets: Targets,
}

/// Owns the eye render target rings, the post-effect buffers and the
/// material shader manager.
///
/// Only one eye category is populated at a time: the multiview ring when
/// multiview is active, the left and right rings otherwise.
pub struct RenderBundle {
    backend: Arc<dyn RenderBackend>,
    width: u32,
    height: u32,
    policy: ConstructionPolicy,
    main_scene: RwLock<Arc<Scene>>,
    state: Mutex<State>,
    shaders: MaterialShaderManager,
}

impl RenderBundle {
    pub fn new(backend: Arc<dyn RenderBackend>, config: &RenderConfig, main_scene: Arc<Scene>) -> Result<Self, RenderError> {
        let (samples, multiview) = resolve_layout(backend.as_ref(), config.multisamples, config.multiview);
        info!(
            "Render bundle {}x{} samples={} multiview={} policy={:?}",
            config.width, config.height, samples, multiview, config.policy
        );

        let bundle = Self {
            backend,
            width: config.width,
            height: config.height,
            policy: config.policy,
            main_scene: RwLock::new(main_scene),
            state: Mutex::new(State {
                samples,
                multiview,
                targets: Targets::default(),
            }),
            shaders: MaterialShaderManager::new(),
        };

        if bundle.policy == ConstructionPolicy::Eager {
            let mut state = bundle.state.lock();
            bundle.build_eye_targets(&mut state)?;
        }
        Ok(bundle)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn policy(&self) -> ConstructionPolicy {
        self.policy
    }

    /// Effective sample count, 0 when multisampling is off.
    pub fn sample_count(&self) -> u32 {
        self.state.lock().samples
    }

    pub fn is_multiview(&self) -> bool {
        self.state.lock().multiview
    }

    pub fn main_scene(&self) -> Arc<Scene> {
        Arc::clone(&self.main_scene.read())
    }

    pub fn shader_manager(&self) -> &MaterialShaderManager {
        &self.shaders
    }

    /// The target for `eye` at buffer `index`, created on first access.
    pub fn render_target(&self, eye: Eye, index: usize) -> Result<Arc<RenderTarget>, RenderError> {
        check_index(index)?;
        let mut state = self.state.lock();
        check_eye(&state, eye)?;
        if let Some(target) = &state.targets.ring(eye)[index] {
            return Ok(Arc::clone(target));
        }
        let target = self.make_target(&mut state, eye, index, None)?;
        link_complete_rings(&state.targets);
        Ok(target)
    }

    /// Create (or replace) the target for `eye` at `index`, optionally around
    /// a compositor-owned swapchain image. A right eye target needs the left
    /// eye target at the same index. Call [`Self::create_render_target_chain`]
    /// once all targets exist.
    pub fn create_render_target(
        &self,
        index: usize,
        eye: Eye,
        external: Option<u64>,
    ) -> Result<Arc<RenderTarget>, RenderError> {
        check_index(index)?;
        let mut state = self.state.lock();
        check_eye(&state, eye)?;
        if eye == Eye::Right && state.targets.left[index].is_none() {
            return Err(RenderError::MissingLeftEye(index));
        }
        self.make_target(&mut state, eye, index, external)
    }

    /// Link the targets of the active category into their rings.
    pub fn create_render_target_chain(&self, multiview: bool) -> Result<(), RenderError> {
        let state = self.state.lock();
        let eyes: &[Eye] = if multiview { &[Eye::Multiview] } else { &[Eye::Left, Eye::Right] };
        for &eye in eyes {
            check_eye(&state, eye)?;
            if !link_ring(state.targets.ring(eye)) {
                return Err(RenderError::IncompleteChain(eye));
            }
        }
        Ok(())
    }

    /// Every target currently alive, eye capture included.
    pub fn live_targets(&self) -> Vec<Arc<RenderTarget>> {
        let state = self.state.lock();
        let targets = &state.targets;
        targets
            .left
            .iter()
            .chain(targets.right.iter())
            .chain(targets.multiview.iter())
            .chain(std::iter::once(&targets.eye_capture))
            .flatten()
            .cloned()
            .collect()
    }

    /// Point every live target at `scene`. Render textures are kept.
    pub fn update_main_scene(&self, scene: Arc<Scene>) {
        let state = self.state.lock();
        *self.main_scene.write() = Arc::clone(&scene);
        let rig = scene.camera_rig();

        for eye in [Eye::Left, Eye::Right, Eye::Multiview] {
            for target in state.targets.ring(eye).iter().flatten() {
                target.set_scene(Arc::clone(&scene));
                target.set_camera(eye_camera(&rig, eye));
            }
        }
        if let Some(capture) = &state.targets.eye_capture {
            capture.set_scene(Arc::clone(&scene));
            capture.set_camera(Arc::clone(&rig.center));
        }
        debug!("Main scene is now '{}'", scene.name());
    }

    /// Apply a new sample count and multiview request. Targets are dropped
    /// and rebuilt only when the effective layout changes. Returns whether a
    /// rebuild happened.
    pub fn reconfigure(&self, multisamples: i32, multiview: bool) -> Result<bool, RenderError> {
        let (samples, multiview) = resolve_layout(self.backend.as_ref(), multisamples, multiview);
        let mut state = self.state.lock();
        if state.samples == samples && state.multiview == multiview {
            return Ok(false);
        }

        info!(
            "Rebuilding render targets: samples {} -> {}, multiview {} -> {}",
            state.samples, samples, state.multiview, multiview
        );
        state.samples = samples;
        state.multiview = multiview;
        state.targets = Targets::default();

        if self.policy == ConstructionPolicy::Eager {
            self.build_eye_targets(&mut state)?;
        }
        Ok(true)
    }

    /// Post-effect buffer, layered when multiview is active.
    pub fn post_effect_texture(&self, which: PostEffect) -> Result<Arc<RenderTexture>, RenderError> {
        let mut state = self.state.lock();
        if let Some(texture) = &state.targets.post_effect[which.index()] {
            return Ok(Arc::clone(texture));
        }
        let layers = if state.multiview { 2 } else { 1 };
        let texture = Arc::new(self.texture(0, layers, None)?);
        state.targets.post_effect[which.index()] = Some(Arc::clone(&texture));
        Ok(texture)
    }

    /// Target used to capture the centre eye. With multiview it renders from
    /// the list culled by the first multiview target.
    pub fn eye_capture_target(&self) -> Result<Arc<RenderTarget>, RenderError> {
        let mut state = self.state.lock();
        if let Some(target) = &state.targets.eye_capture {
            return Ok(Arc::clone(target));
        }

        let source = if state.multiview {
            let source = match state.targets.multiview[0].clone() {
                Some(target) => target,
                None => self.make_target(&mut state, Eye::Multiview, 0, None)?,
            };
            link_complete_rings(&state.targets);
            Some(source)
        } else {
            None
        };

        let scene = self.main_scene();
        let texture = Arc::new(self.texture(state.samples, 1, None)?);
        let target = match source {
            Some(source) => RenderTarget::sharing_render_list(texture, Arc::clone(&scene), &source),
            None => RenderTarget::new(texture, Arc::clone(&scene)),
        };
        target.set_camera(Arc::clone(&scene.camera_rig().center));
        state.targets.eye_capture = Some(Arc::clone(&target));
        Ok(target)
    }

    pub fn eye_capture_post_effect_texture(&self, which: PostEffect) -> Result<Arc<RenderTexture>, RenderError> {
        let mut state = self.state.lock();
        if let Some(texture) = &state.targets.eye_capture_post_effect[which.index()] {
            return Ok(Arc::clone(texture));
        }
        let texture = Arc::new(self.texture(0, 1, None)?);
        state.targets.eye_capture_post_effect[which.index()] = Some(Arc::clone(&texture));
        Ok(texture)
    }

    fn texture(&self, samples: u32, layers: u32, external: Option<u64>) -> Result<RenderTexture, RenderError> {
        RenderTexture::new(
            &self.backend,
            RenderTextureDesc {
                width: self.width,
                height: self.height,
                samples,
                layers,
                external,
            },
        )
    }

    fn build_eye_targets(&self, state: &mut State) -> Result<(), RenderError> {
        let eyes: &[Eye] = if state.multiview { &[Eye::Multiview] } else { &[Eye::Left, Eye::Right] };
        for &eye in eyes {
            for index in 0..BUFFER_COUNT {
                if state.targets.ring(eye)[index].is_none() {
                    self.make_target(state, eye, index, None)?;
                }
            }
        }
        link_complete_rings(&state.targets);
        Ok(())
    }

    fn make_target(
        &self,
        state: &mut State,
        eye: Eye,
        index: usize,
        external: Option<u64>,
    ) -> Result<Arc<RenderTarget>, RenderError> {
        let left = match eye {
            Eye::Right => Some(match state.targets.left[index].clone() {
                Some(left) => left,
                None => self.make_target(state, Eye::Left, index, None)?,
            }),
            _ => None,
        };

        let layers = if eye == Eye::Multiview { 2 } else { 1 };
        let texture = Arc::new(self.texture(state.samples, layers, external)?);
        let scene = self.main_scene();
        let camera = eye_camera(&scene.camera_rig(), eye);
        let target = match (eye, left) {
            (Eye::Multiview, _) => RenderTarget::new_multiview(texture, scene),
            (_, Some(left)) => RenderTarget::new_paired(texture, scene, &left),
            _ => RenderTarget::new(texture, scene),
        };
        target.set_camera(camera);

        let replaced = state.targets.ring_mut(eye)[index]
            .replace(Arc::clone(&target))
            .is_some();
        if replaced && eye == Eye::Left && state.targets.right[index].take().is_some() {
            debug!("Dropped right eye target {} paired with the replaced left target", index);
        }
        debug!("Created {:?} render target {}", eye, index);
        Ok(target)
    }
}

impl std::fmt::Debug for RenderBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RenderBundle")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("samples", &state.samples)
            .field("multiview", &state.multiview)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn resolve_layout(backend: &dyn RenderBackend, multisamples: i32, multiview: bool) -> (u32, bool) {
    let samples = clamp_sample_count(multisamples, backend.max_sample_count());
    if multisamples > 1 && samples != multisamples as u32 {
        debug!("Sample count {} clamped to {}", multisamples, samples);
    }
    let supported = backend.supports_multiview();
    if multiview && !supported {
        warn!("Multiview requested but not supported, rendering each eye separately");
    }
    (samples, multiview && supported)
}

fn check_index(index: usize) -> Result<(), RenderError> {
    if index < BUFFER_COUNT {
        Ok(())
    } else {
        Err(RenderError::InvalidBufferIndex(index))
    }
}

fn check_eye(state: &State, eye: Eye) -> Result<(), RenderError> {
    let active = match eye {
        Eye::Multiview => state.multiview,
        Eye::Left | Eye::Right => !state.multiview,
    };
    if active {
        Ok(())
    } else {
        Err(RenderError::EyeNotConfigured(eye))
    }
}

// The rig's centre camera drives both views of a multiview pass.
fn eye_camera(rig: &CameraRig, eye: Eye) -> Arc<Camera> {
    match eye {
        Eye::Left => Arc::clone(&rig.left),
        Eye::Right => Arc::clone(&rig.right),
        Eye::Multiview => Arc::clone(&rig.center),
    }
}

/// Link target[i] to target[(i + 1) % 3]. False if a slot is still empty.
fn link_ring(ring: &Ring) -> bool {
    let targets: Option<Vec<&Arc<RenderTarget>>> = ring.iter().map(Option::as_ref).collect();
    let Some(targets) = targets else {
        return false;
    };
    for (i, target) in targets.iter().enumerate() {
        target.attach_render_target(targets[(i + 1) % BUFFER_COUNT]);
    }
    true
}

fn link_complete_rings(targets: &Targets) {
    for eye in [Eye::Left, Eye::Right, Eye::Multiview] {
        link_ring(targets.ring(eye));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::tests::FakeBackend;
    use crate::texture::RenderTextureId;

    fn config(multiview: bool, policy: ConstructionPolicy) -> RenderConfig {
        RenderConfig {
            width: 128,
            height: 128,
            multisamples: 4,
            multiview,
            policy,
        }
    }

    fn bundle(fake: &Arc<FakeBackend>, multiview: bool, policy: ConstructionPolicy) -> RenderBundle {
        let backend: Arc<dyn RenderBackend> = fake.clone();
        RenderBundle::new(backend, &config(multiview, policy), Scene::new("main")).unwrap()
    }

    fn assert_ring(bundle: &RenderBundle, eye: Eye) {
        for i in 0..BUFFER_COUNT {
            let target = bundle.render_target(eye, i).unwrap();
            let expected = bundle.render_target(eye, (i + 1) % BUFFER_COUNT).unwrap();
            assert!(Arc::ptr_eq(&target.next().unwrap(), &expected), "{eye:?}[{i}]");
        }
    }

    #[test]
    fn eager_stereo_targets_form_rings_and_pairs() {
        let fake = FakeBackend::new(8, true);
        let bundle = bundle(&fake, false, ConstructionPolicy::Eager);
        assert_eq!(fake.created.lock().len(), 6);

        assert_ring(&bundle, Eye::Left);
        assert_ring(&bundle, Eye::Right);
        for i in 0..BUFFER_COUNT {
            let left = bundle.render_target(Eye::Left, i).unwrap();
            let right = bundle.render_target(Eye::Right, i).unwrap();
            assert!(Arc::ptr_eq(right.paired_left().unwrap(), &left));
            assert!(right.shares_render_list(&left));
        }
        assert!(matches!(
            bundle.render_target(Eye::Multiview, 0),
            Err(RenderError::EyeNotConfigured(Eye::Multiview))
        ));
        // lookups never allocate once built
        assert_eq!(fake.created.lock().len(), 6);
    }

    #[test]
    fn multiview_populates_only_the_multiview_ring() {
        let fake = FakeBackend::new(8, true);
        let bundle = bundle(&fake, true, ConstructionPolicy::Eager);
        assert!(bundle.is_multiview());
        assert_eq!(fake.created.lock().len(), 3);
        assert!(fake.created.lock().iter().all(|desc| desc.layers == 2));

        assert_ring(&bundle, Eye::Multiview);
        assert!(bundle.render_target(Eye::Multiview, 1).unwrap().is_multiview());
        for eye in [Eye::Left, Eye::Right] {
            assert!(matches!(
                bundle.render_target(eye, 0),
                Err(RenderError::EyeNotConfigured(e)) if e == eye
            ));
        }
        assert_eq!(bundle.live_targets().len(), 3);
    }

    #[test]
    fn multiview_without_device_support_falls_back_to_stereo() {
        let fake = FakeBackend::new(8, false);
        let bundle = bundle(&fake, true, ConstructionPolicy::Eager);
        assert!(!bundle.is_multiview());
        assert_eq!(bundle.live_targets().len(), 6);
    }

    #[test]
    fn lazy_targets_are_built_on_first_access() {
        let fake = FakeBackend::new(8, false);
        let bundle = bundle(&fake, false, ConstructionPolicy::Lazy);
        assert!(fake.created.lock().is_empty());

        let first = bundle.render_target(Eye::Left, 0).unwrap();
        assert!(Arc::ptr_eq(&first, &bundle.render_target(Eye::Left, 0).unwrap()));
        assert!(first.next().is_none());

        // right eye pulls in its left partner
        let right = bundle.render_target(Eye::Right, 1).unwrap();
        assert!(Arc::ptr_eq(right.paired_left().unwrap(), &bundle.render_target(Eye::Left, 1).unwrap()));
        assert_eq!(fake.created.lock().len(), 3);

        bundle.render_target(Eye::Left, 2).unwrap();
        assert_ring(&bundle, Eye::Left);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let fake = FakeBackend::new(8, false);
        let bundle = bundle(&fake, false, ConstructionPolicy::Lazy);
        assert!(matches!(
            bundle.render_target(Eye::Left, 3),
            Err(RenderError::InvalidBufferIndex(3))
        ));
        assert!(matches!(
            bundle.create_render_target(7, Eye::Left, None),
            Err(RenderError::InvalidBufferIndex(7))
        ));
    }

    #[test]
    fn update_main_scene_keeps_render_textures() {
        let fake = FakeBackend::new(8, false);
        let bundle = bundle(&fake, false, ConstructionPolicy::Eager);
        bundle.eye_capture_target().unwrap();
        let before: Vec<RenderTextureId> = bundle.live_targets().iter().map(|t| t.texture().id()).collect();
        let allocated = fake.created.lock().len();

        let lobby = Scene::new("lobby");
        bundle.update_main_scene(Arc::clone(&lobby));

        let targets = bundle.live_targets();
        let after: Vec<RenderTextureId> = targets.iter().map(|t| t.texture().id()).collect();
        assert_eq!(before, after);
        assert_eq!(fake.created.lock().len(), allocated);
        assert!(fake.released.lock().is_empty());
        assert!(targets.iter().all(|t| Arc::ptr_eq(&t.scene(), &lobby)));
        assert!(Arc::ptr_eq(&bundle.main_scene(), &lobby));

        let rig = lobby.camera_rig();
        let right = bundle.render_target(Eye::Right, 0).unwrap();
        assert!(Arc::ptr_eq(&right.camera().unwrap(), &rig.right));
    }

    #[test]
    fn reconfigure_rebuilds_only_when_layout_changes() {
        let fake = FakeBackend::new(4, true);
        let bundle = bundle(&fake, false, ConstructionPolicy::Eager);
        assert_eq!(bundle.sample_count(), 4);

        // 8 clamps to the same effective 4
        assert!(!bundle.reconfigure(8, false).unwrap());
        assert!(fake.released.lock().is_empty());

        assert!(bundle.reconfigure(4, true).unwrap());
        assert_eq!(fake.released.lock().len(), 6);
        assert_eq!(bundle.live_targets().len(), 3);
        assert!(bundle.render_target(Eye::Multiview, 0).is_ok());

        assert!(bundle.reconfigure(0, true).unwrap());
        assert_eq!(bundle.sample_count(), 0);
        let created = fake.created.lock();
        assert!(created[created.len() - 3..].iter().all(|desc| desc.samples == 0));
    }

    #[test]
    fn external_targets_need_explicit_chaining() {
        let fake = FakeBackend::new(4, false);
        let bundle = bundle(&fake, false, ConstructionPolicy::Lazy);

        assert!(matches!(
            bundle.create_render_target(0, Eye::Right, Some(10)),
            Err(RenderError::MissingLeftEye(0))
        ));
        for i in 0..BUFFER_COUNT {
            let handle = 100 + i as u64;
            let left = bundle.create_render_target(i, Eye::Left, Some(handle)).unwrap();
            assert!(left.texture().is_external());
            if i < 2 {
                bundle.create_render_target(i, Eye::Right, Some(handle + 10)).unwrap();
            }
        }
        assert!(matches!(
            bundle.create_render_target_chain(false),
            Err(RenderError::IncompleteChain(Eye::Right))
        ));
        bundle.create_render_target(2, Eye::Right, Some(112)).unwrap();
        bundle.create_render_target_chain(false).unwrap();
        assert_ring(&bundle, Eye::Left);
        assert_ring(&bundle, Eye::Right);
        assert!(matches!(
            bundle.create_render_target_chain(true),
            Err(RenderError::EyeNotConfigured(Eye::Multiview))
        ));
    }

    #[test]
    fn replacing_a_left_target_drops_its_right_partner() {
        let fake = FakeBackend::new(4, false);
        let bundle = bundle(&fake, false, ConstructionPolicy::Eager);
        let old_right = bundle.render_target(Eye::Right, 0).unwrap();
        let left = bundle.create_render_target(0, Eye::Left, Some(5)).unwrap();
        let right = bundle.render_target(Eye::Right, 0).unwrap();
        assert!(!Arc::ptr_eq(&old_right, &right));
        assert!(Arc::ptr_eq(right.paired_left().unwrap(), &left));
    }

    #[test]
    fn post_effect_and_eye_capture_buffers() {
        let fake = FakeBackend::new(4, true);
        let bundle = bundle(&fake, true, ConstructionPolicy::Lazy);

        let a = bundle.post_effect_texture(PostEffect::A).unwrap();
        let b = bundle.post_effect_texture(PostEffect::B).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.layers(), 2);
        assert!(Arc::ptr_eq(&a, &bundle.post_effect_texture(PostEffect::A).unwrap()));
        assert_eq!(bundle.eye_capture_post_effect_texture(PostEffect::A).unwrap().layers(), 1);

        let capture = bundle.eye_capture_target().unwrap();
        let first = bundle.render_target(Eye::Multiview, 0).unwrap();
        assert!(capture.shares_render_list(&first));
        let rig = bundle.main_scene().camera_rig();
        assert!(Arc::ptr_eq(&capture.camera().unwrap(), &rig.center));
        assert!(Arc::ptr_eq(&capture, &bundle.eye_capture_target().unwrap()));
    }

    #[test]
    fn dropping_the_bundle_releases_every_texture() {
        let fake = FakeBackend::new(2, false);
        let bundle = bundle(&fake, false, ConstructionPolicy::Eager);
        bundle.post_effect_texture(PostEffect::A).unwrap();
        drop(bundle);
        assert_eq!(fake.released.lock().len(), fake.created.lock().len());
    }
}
