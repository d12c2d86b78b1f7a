//! vrf - Headless stereo viewer
//!
//! Loads the models named on the command line into one scene and runs the
//! eye render target rings against a headless GPU until every load has
//! finished and its textures are uploaded.

mod headless;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vrf_assets::{AssetLoader, FileVolume, LoadOptions, PendingAsset};
use vrf_core::{AssetEvents, Scene, SceneNode, Texture};
use vrf_render::{Eye, RenderBundle, RenderError, BUFFER_COUNT};

use headless::HeadlessGpu;
use settings::ViewerSettings;

/// Logs every asset event the loader broadcasts.
struct LoadLog;

impl AssetEvents for LoadLog {
    fn on_model_loaded(&self, model: &Arc<SceneNode>, file: &str) {
        info!("Model {} imported ({} nodes)", file, model.descendants().len());
    }

    fn on_model_error(&self, error: &str, file: &str) {
        warn!("Model {} failed: {}", file, error);
    }

    fn on_texture_error(&self, error: &str, file: &str) {
        warn!("Texture {} failed: {}", file, error);
    }

    fn on_texture_loaded(&self, texture: &Texture, file: &str) {
        tracing::debug!("Texture {} decoded into {:?}", file, texture.id());
    }
}

struct Load {
    path: PathBuf,
    pending: PendingAsset,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let save = args.iter().any(|a| a == "--save-settings");
    args.retain(|a| a != "--save-settings");

    let settings = ViewerSettings::load();
    if save {
        settings.save().context("Failed to save settings")?;
    }
    if args.is_empty() {
        info!("Usage: vrf [--save-settings] <model>...");
        return Ok(());
    }

    info!("Starting vrf viewer...");

    let gpu = Arc::new(HeadlessGpu::new(settings.device.max_samples, settings.device.multiview));
    let scene = Scene::new("main");
    let bundle = RenderBundle::new(gpu.clone(), &settings.eye_buffer, Arc::clone(&scene))
        .context("Failed to create render bundle")?;
    let loader = AssetLoader::new(settings.loader).context("Failed to create asset loader")?;
    loader.events().subscribe(Arc::new(LoadLog));

    let mut loads: Vec<Load> = args
        .into_iter()
        .map(PathBuf::from)
        .map(|path| {
            let volume = Arc::new(FileVolume::new(&path));
            let load = loader.load_model_async(volume, LoadOptions::new().scene(Arc::clone(&scene)));
            Load {
                path,
                pending: load.pending,
            }
        })
        .collect();

    let started = Instant::now();
    let interval = Duration::from_millis(settings.frames.interval_ms);
    let mut frame = 0u64;
    loop {
        let uploaded = loader.uploads().flush(gpu.as_ref());
        if uploaded > 0 {
            info!("Uploaded {} textures", uploaded);
        }

        let drawn = render_frame(&bundle, frame).context("Frame failed")?;

        loads.retain(|load| match load.pending.try_recv() {
            Some(done) => {
                match &done.errors {
                    Some(errors) => warn!("Loaded {:?} with errors:\n{}", load.path, errors),
                    None => info!("Loaded {:?}", load.path),
                }
                false
            }
            None => true,
        });

        frame += 1;
        if loads.is_empty() && loader.uploads().is_empty() {
            info!(
                "All loads finished after {} frames ({:.2?}), {} nodes drawn last frame",
                frame,
                started.elapsed(),
                drawn
            );
            break;
        }
        if frame >= settings.frames.max_frames {
            warn!("Stopping after {} frames with {} loads pending", frame, loads.len());
            break;
        }
        std::thread::sleep(interval);
    }

    info!(
        "{} textures on the GPU ({} bytes uploaded), {} render textures, {} material shaders",
        gpu.texture_count(),
        gpu.uploaded_bytes(),
        gpu.live_render_textures(),
        bundle.shader_manager().len()
    );
    Ok(())
}

/// Cull the scene into the current buffer of each eye and pick a shader for
/// every visible material. Returns the number of visible nodes.
fn render_frame(bundle: &RenderBundle, frame: u64) -> Result<usize, RenderError> {
    let index = frame as usize % BUFFER_COUNT;
    let eyes: &[Eye] = if bundle.is_multiview() {
        &[Eye::Multiview]
    } else {
        &[Eye::Left, Eye::Right]
    };

    let mut drawn = 0;
    for &eye in eyes {
        let target = bundle.render_target(eye, index)?;
        // right eye draws from the list its left partner culled
        if eye != Eye::Right {
            drawn += target.cull();
        }
        for node in target.render_list() {
            if let Some(material) = node.material() {
                bundle.shader_manager().shader_for(&material);
            }
        }
    }
    Ok(drawn)
}
