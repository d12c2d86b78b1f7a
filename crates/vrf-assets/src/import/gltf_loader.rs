use base64::Engine as _;
use gltf::Gltf;
use tracing::debug;

use vrf_core::{CameraParams, Color, TextureSlot, Transform};

use crate::config::ImportSettings;
use crate::error::AssetError;
use crate::import::{
    EmbeddedTexture, FileIo, ParsedAnimation, ParsedMaterial, ParsedMesh, ParsedNode, ParsedScene, SceneImportLibrary,
    TextureRef,
};
use crate::volume::{base_name, parent_dir};

/// glTF 2.0 importer (.gltf and .glb).
#[derive(Debug, Default, Clone, Copy)]
pub struct GltfLibrary;

impl SceneImportLibrary for GltfLibrary {
    fn name(&self) -> &'static str {
        "gltf"
    }

    fn import_file(
        &self,
        path: &str,
        settings: &ImportSettings,
        io: &dyn FileIo,
    ) -> Result<Option<ParsedScene>, AssetError> {
        let bytes = io.read(path)?;
        let gltf = Gltf::from_slice(&bytes).map_err(|e| AssetError::Import(path.to_string(), e.to_string()))?;
        let dir = parent_dir(path);
        let buffers = load_buffers(&gltf, path, dir, io)?;
        let document = &gltf.document;

        let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) else {
            return Ok(None);
        };

        let mut parsed = ParsedScene::new(base_name(path));

        // Image index -> texture path; embedded images become `*N`.
        let mut image_paths = Vec::new();
        for image in document.images() {
            let texture_path = match image.source() {
                gltf::image::Source::View { view, mime_type } => {
                    let start = view.offset();
                    let end = start + view.length();
                    let data = buffers
                        .get(view.buffer().index())
                        .and_then(|b| b.get(start..end))
                        .ok_or_else(|| AssetError::Import(path.to_string(), format!("image {} is out of bounds", image.index())))?;
                    embed(&mut parsed, data.to_vec(), Some(mime_type.to_string()))
                }
                gltf::image::Source::Uri { uri, mime_type } => match decode_data_uri(path, uri)? {
                    Some(data) => embed(&mut parsed, data, mime_type.map(str::to_string)),
                    None => format!("{dir}{uri}"),
                },
            };
            image_paths.push(texture_path);
        }

        for material in document.materials() {
            let pbr = material.pbr_metallic_roughness();
            let mut textures = Vec::new();
            let mut add = |slot: TextureSlot, image: usize| {
                if let Some(p) = image_paths.get(image) {
                    textures.push(TextureRef { slot, path: p.clone() });
                }
            };
            if let Some(info) = pbr.base_color_texture() {
                add(TextureSlot::Diffuse, info.texture().source().index());
            }
            if let Some(info) = pbr.metallic_roughness_texture() {
                add(TextureSlot::Specular, info.texture().source().index());
            }
            if let Some(normal) = material.normal_texture() {
                add(TextureSlot::Normal, normal.texture().source().index());
            }
            if let Some(info) = material.emissive_texture() {
                add(TextureSlot::Emissive, info.texture().source().index());
            }
            if let Some(occlusion) = material.occlusion_texture() {
                add(TextureSlot::Occlusion, occlusion.texture().source().index());
            }
            parsed.materials.push(ParsedMaterial {
                name: material.name().unwrap_or("material").to_string(),
                diffuse: Color::from_array(pbr.base_color_factor()),
                textures,
            });
        }

        // glTF mesh index -> parsed mesh indices, one per primitive.
        let mut mesh_primitives = Vec::new();
        for mesh in document.meshes() {
            let name = mesh.name().unwrap_or("unnamed").to_string();
            let mut indices = Vec::new();
            for (i, primitive) in mesh.primitives().enumerate() {
                let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
                let positions: Vec<[f32; 3]> = reader
                    .read_positions()
                    .map(|iter| iter.collect())
                    .unwrap_or_default();
                let normals: Vec<[f32; 3]> = reader
                    .read_normals()
                    .map(|iter| iter.collect())
                    .unwrap_or_default();
                let tex_coords: Option<Vec<[f32; 2]>> = reader
                    .read_tex_coords(0)
                    .map(|tc| tc.into_f32().collect());
                let triangles: Option<Vec<u32>> = reader
                    .read_indices()
                    .map(|idx| idx.into_u32().collect());

                indices.push(parsed.meshes.len());
                parsed.meshes.push(ParsedMesh {
                    name: if i == 0 { name.clone() } else { format!("{name}.{i}") },
                    positions,
                    normals,
                    tex_coords,
                    indices: triangles,
                    material: primitive.material().index(),
                    bones: Vec::new(),
                });
            }
            debug!("Loaded mesh '{}' with {} primitives", name, indices.len());
            mesh_primitives.push(indices);
        }

        for node in scene.nodes() {
            add_node(&mut parsed, 0, &node, &mesh_primitives);
        }

        if !settings.no_animation {
            for animation in document.animations() {
                let duration = animation
                    .channels()
                    .filter_map(|channel| {
                        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
                        reader.read_inputs().map(|inputs| inputs.fold(0.0f32, f32::max))
                    })
                    .fold(0.0f32, f32::max);
                parsed.animations.push(ParsedAnimation {
                    name: animation
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("animation{}", animation.index())),
                    duration,
                });
            }
        }

        debug!(
            "glTF '{}': {} nodes, {} meshes, {} materials, {} embedded images",
            path,
            parsed.nodes.len(),
            parsed.meshes.len(),
            parsed.materials.len(),
            parsed.embedded_textures.len()
        );
        Ok(Some(parsed))
    }
}

fn embed(parsed: &mut ParsedScene, bytes: Vec<u8>, format_hint: Option<String>) -> String {
    let index = parsed.embedded_textures.len();
    parsed
        .embedded_textures
        .push(EmbeddedTexture::Compressed { bytes, format_hint });
    format!("*{index}")
}

fn add_node(parsed: &mut ParsedScene, parent: usize, node: &gltf::Node<'_>, mesh_primitives: &[Vec<usize>]) {
    let (translation, rotation, scale) = node.transform().decomposed();
    let camera = node.camera().map(|camera| match camera.projection() {
        gltf::camera::Projection::Perspective(p) => CameraParams {
            near: p.znear(),
            far: p.zfar().unwrap_or(CameraParams::default().far),
            ..CameraParams::default()
        },
        gltf::camera::Projection::Orthographic(o) => CameraParams {
            near: o.znear(),
            far: o.zfar(),
            ..CameraParams::default()
        },
    });
    let meshes = node
        .mesh()
        .and_then(|m| mesh_primitives.get(m.index()))
        .cloned()
        .unwrap_or_default();

    if let Some(skin) = node.skin() {
        let bones: Vec<String> = skin
            .joints()
            .map(|joint| {
                joint
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("joint{}", joint.index()))
            })
            .collect();
        for &m in &meshes {
            if let Some(mesh) = parsed.meshes.get_mut(m) {
                mesh.bones = bones.clone();
            }
        }
    }

    let index = parsed.add_node(
        parent,
        ParsedNode {
            name: node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node{}", node.index())),
            transform: Transform::from_decomposed(translation, rotation, scale),
            meshes,
            camera,
            children: Vec::new(),
        },
    );
    for child in node.children() {
        add_node(parsed, index, &child, mesh_primitives);
    }
}

fn load_buffers(gltf: &Gltf, path: &str, dir: &str, io: &dyn FileIo) -> Result<Vec<Vec<u8>>, AssetError> {
    let mut buffers = Vec::new();
    for buffer in gltf.document.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or_else(|| AssetError::Import(path.to_string(), "missing binary chunk".into()))?,
            gltf::buffer::Source::Uri(uri) => match decode_data_uri(path, uri)? {
                Some(data) => data,
                None => io.read(&format!("{dir}{uri}"))?.as_ref().clone(),
            },
        };
        if data.len() < buffer.length() {
            return Err(AssetError::Import(
                path.to_string(),
                format!("buffer {} holds {} bytes, expected {}", buffer.index(), data.len(), buffer.length()),
            ));
        }
        buffers.push(data);
    }
    Ok(buffers)
}

/// Contents of a `data:` URI, or `None` for any other URI.
fn decode_data_uri(path: &str, uri: &str) -> Result<Option<Vec<u8>>, AssetError> {
    let Some(rest) = uri.strip_prefix("data:") else {
        return Ok(None);
    };
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| AssetError::Import(path.to_string(), "malformed data URI".into()))?;
    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map(Some)
            .map_err(|e| AssetError::Import(path.to_string(), format!("bad base64 data URI: {e}")))
    } else {
        Ok(Some(data.as_bytes().to_vec()))
    }
}
