use std::sync::Arc;

use tracing::debug;

use vrf_core::{AnimationClip, Animator, Material, Mesh, SceneNode, Texture};

use crate::import::{ParsedMaterial, ParsedMesh, ParsedNode, ParsedScene};
use crate::request::AssetRequest;
use crate::texture_request::TextureRequest;

struct Built {
    meshes: Vec<Arc<Mesh>>,
    materials: Vec<Arc<Material>>,
}

/// Populate `root` from `parsed`. Every texture reference becomes one
/// texture request routed through `request`.
pub(super) fn build_scene(request: &Arc<AssetRequest>, root: &Arc<SceneNode>, parsed: &ParsedScene) {
    let flip_uv = request.settings().flip_uv;
    let built = Built {
        materials: parsed
            .materials
            .iter()
            .map(|m| Arc::new(build_material(request, m, parsed)))
            .collect(),
        meshes: parsed.meshes.iter().map(|m| Arc::new(build_mesh(m, flip_uv))).collect(),
    };

    if let Some(parsed_root) = parsed.nodes.first() {
        populate(root, parsed_root, parsed, &built);
    }

    let settings = request.settings();
    if !settings.no_animation && !parsed.animations.is_empty() {
        let clips = parsed
            .animations
            .iter()
            .map(|a| AnimationClip {
                name: a.name.clone(),
                duration: a.duration,
            })
            .collect();
        root.set_animator(Arc::new(Animator::new(clips, settings.start_animations)));
    }

    debug!(
        "Built {}: {} nodes, {} meshes, {} materials",
        request.file_name(),
        parsed.nodes.len(),
        built.meshes.len(),
        built.materials.len()
    );
}

fn populate(node: &Arc<SceneNode>, parsed_node: &ParsedNode, parsed: &ParsedScene, built: &Built) {
    node.set_transform(parsed_node.transform);
    if let Some(camera) = parsed_node.camera {
        node.set_camera(camera);
    }

    match parsed_node.meshes.as_slice() {
        [] => {}
        [single] => attach_mesh(node, *single, parsed, built),
        many => {
            for (i, &mesh) in many.iter().enumerate() {
                let child = SceneNode::new(format!("{}-{}", parsed_node.name, i));
                attach_mesh(&child, mesh, parsed, built);
                node.add_child(child);
            }
        }
    }

    for &index in &parsed_node.children {
        let Some(parsed_child) = parsed.nodes.get(index) else {
            continue;
        };
        let child = SceneNode::new(parsed_child.name.clone());
        populate(&child, parsed_child, parsed, built);
        node.add_child(child);
    }
}

fn attach_mesh(node: &Arc<SceneNode>, index: usize, parsed: &ParsedScene, built: &Built) {
    let Some(mesh) = built.meshes.get(index) else {
        return;
    };
    node.set_mesh(Arc::clone(mesh));
    let material = parsed
        .meshes
        .get(index)
        .and_then(|m| m.material)
        .and_then(|i| built.materials.get(i));
    if let Some(material) = material {
        node.set_material(Arc::clone(material));
    }
}

fn build_material(request: &Arc<AssetRequest>, parsed_material: &ParsedMaterial, parsed: &ParsedScene) -> Material {
    let mut material = Material::new(parsed_material.name.clone());
    material.diffuse = parsed_material.diffuse;
    if request.settings().no_textures {
        return material;
    }

    for texture_ref in &parsed_material.textures {
        let texture = Texture::new(request.texture_parameters());
        let texture_request = TextureRequest::for_asset(request, texture.clone(), texture_ref.path.clone());
        match texture_ref
            .embedded_index()
            .and_then(|i| parsed.embedded_textures.get(i))
        {
            Some(embedded) => request.load_embedded_texture(texture_request, embedded),
            None => request.load_texture(texture_request),
        }
        material.set_texture(texture_ref.slot, texture);
    }
    material
}

fn build_mesh(parsed: &ParsedMesh, flip_uv: bool) -> Mesh {
    let tex_coords = parsed.tex_coords.as_ref().map(|uvs| {
        if flip_uv {
            uvs.iter().map(|[u, v]| [*u, 1.0 - *v]).collect()
        } else {
            uvs.clone()
        }
    });
    Mesh {
        name: parsed.name.clone(),
        positions: parsed.positions.clone(),
        normals: parsed.normals.clone(),
        tex_coords,
        indices: parsed.indices.clone(),
        bones: parsed.bones.clone(),
    }
}
