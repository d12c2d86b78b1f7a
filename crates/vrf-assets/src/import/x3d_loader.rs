//! X3D scene importer.
//!
//! Handles the static subset used by VR scenes: `Transform`/`Group`
//! hierarchies, `Shape` with `IndexedFaceSet` geometry, `Material` and
//! `ImageTexture` appearance, and `Viewpoint`, which becomes the
//! `MainCamera` node.

use roxmltree::Node;
use tracing::debug;

use vrf_core::{CameraParams, Color, Quat, TextureSlot, Transform, Vec3};

use crate::config::ImportSettings;
use crate::error::AssetError;
use crate::import::{FileIo, ParsedMaterial, ParsedMesh, ParsedNode, ParsedScene, SceneImportLibrary, TextureRef};
use crate::request::MAIN_CAMERA_NODE;
use crate::volume::{base_name, parent_dir};

/// X3D importer (.x3d).
#[derive(Debug, Default, Clone, Copy)]
pub struct X3dLibrary;

impl SceneImportLibrary for X3dLibrary {
    fn name(&self) -> &'static str {
        "x3d"
    }

    fn import_file(
        &self,
        path: &str,
        _settings: &ImportSettings,
        io: &dyn FileIo,
    ) -> Result<Option<ParsedScene>, AssetError> {
        let bytes = io.read(path)?;
        let text = std::str::from_utf8(&bytes).map_err(|e| AssetError::Import(path.to_string(), e.to_string()))?;
        let document = roxmltree::Document::parse(text).map_err(|e| AssetError::Import(path.to_string(), e.to_string()))?;

        let Some(scene) = document.descendants().find(|n| n.has_tag_name("Scene")) else {
            return Ok(None);
        };

        let mut parser = Parser {
            path,
            dir: parent_dir(path),
            parsed: ParsedScene::new(base_name(path)),
        };
        for child in scene.children().filter(Node::is_element) {
            parser.visit(child, 0)?;
        }
        debug!(
            "X3D '{}': {} nodes, {} meshes",
            path,
            parser.parsed.nodes.len(),
            parser.parsed.meshes.len()
        );
        Ok(Some(parser.parsed))
    }
}

struct Parser<'a> {
    path: &'a str,
    dir: &'a str,
    parsed: ParsedScene,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> AssetError {
        AssetError::Import(self.path.to_string(), message.into())
    }

    fn visit(&mut self, element: Node<'_, '_>, parent: usize) -> Result<(), AssetError> {
        if element.attribute("USE").is_some() {
            debug!("Skipping USE reference in {}", self.path);
            return Ok(());
        }
        match element.tag_name().name() {
            "Transform" => {
                let transform = self.transform(element)?;
                let index = self.node(parent, element, "Transform", transform);
                self.visit_children(element, index)
            }
            "Group" | "Anchor" | "Collision" | "Switch" | "LOD" | "StaticGroup" => {
                let index = self.node(parent, element, element.tag_name().name(), Transform::default());
                self.visit_children(element, index)
            }
            "Shape" => self.shape(element, parent),
            "Viewpoint" => self.viewpoint(element, parent),
            other => {
                debug!("Ignoring X3D element {}", other);
                Ok(())
            }
        }
    }

    fn visit_children(&mut self, element: Node<'_, '_>, parent: usize) -> Result<(), AssetError> {
        for child in element.children().filter(Node::is_element) {
            self.visit(child, parent)?;
        }
        Ok(())
    }

    fn node(&mut self, parent: usize, element: Node<'_, '_>, fallback: &str, transform: Transform) -> usize {
        let name = element.attribute("DEF").unwrap_or(fallback).to_string();
        self.parsed.add_node(
            parent,
            ParsedNode {
                name,
                transform,
                ..Default::default()
            },
        )
    }

    fn transform(&self, element: Node<'_, '_>) -> Result<Transform, AssetError> {
        let mut transform = Transform::default();
        if let Some(t) = self.vec3(element, "translation")? {
            transform.position = t;
        }
        if let Some(s) = self.vec3(element, "scale")? {
            transform.scale = s;
        }
        if let Some(r) = self.rotation(element, "rotation")? {
            transform.rotation = r;
        }
        Ok(transform)
    }

    fn shape(&mut self, element: Node<'_, '_>, parent: usize) -> Result<(), AssetError> {
        let Some(geometry) = element.children().find(|n| n.has_tag_name("IndexedFaceSet")) else {
            debug!("Shape without IndexedFaceSet in {}", self.path);
            return Ok(());
        };
        let mut mesh = self.face_set(geometry)?;
        if let Some(appearance) = element.children().find(|n| n.has_tag_name("Appearance")) {
            mesh.material = Some(self.material(appearance)?);
        }
        let name = element.attribute("DEF").unwrap_or("Shape").to_string();
        mesh.name = name.clone();
        let mesh_index = self.parsed.meshes.len();
        self.parsed.meshes.push(mesh);
        self.parsed.add_node(
            parent,
            ParsedNode {
                name,
                meshes: vec![mesh_index],
                ..Default::default()
            },
        );
        Ok(())
    }

    fn material(&mut self, appearance: Node<'_, '_>) -> Result<usize, AssetError> {
        let mut material = ParsedMaterial {
            name: appearance.attribute("DEF").unwrap_or("Appearance").to_string(),
            diffuse: Color::WHITE,
            textures: Vec::new(),
        };
        if let Some(m) = appearance.children().find(|n| n.has_tag_name("Material")) {
            let diffuse = self.vec3(m, "diffuseColor")?.unwrap_or(Vec3::splat(0.8));
            let transparency = match m.attribute("transparency") {
                Some(t) => self.floats(t)?.first().copied().unwrap_or(0.0),
                None => 0.0,
            };
            material.diffuse = Color::rgba(diffuse.x, diffuse.y, diffuse.z, 1.0 - transparency);
        }
        if let Some(texture) = appearance.children().find(|n| n.has_tag_name("ImageTexture")) {
            if let Some(url) = texture.attribute("url").and_then(first_url) {
                material.textures.push(TextureRef {
                    slot: TextureSlot::Diffuse,
                    path: format!("{}{}", self.dir, url),
                });
            }
        }
        let index = self.parsed.materials.len();
        self.parsed.materials.push(material);
        Ok(index)
    }

    fn face_set(&self, geometry: Node<'_, '_>) -> Result<ParsedMesh, AssetError> {
        let points = match geometry.children().find(|n| n.has_tag_name("Coordinate")) {
            Some(c) => self.floats(c.attribute("point").unwrap_or(""))?,
            None => return Err(self.error("IndexedFaceSet without Coordinate")),
        };
        let points: Vec<[f32; 3]> = points.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        let coord_index = self.ints(geometry.attribute("coordIndex").unwrap_or(""))?;
        let polygons =
            triangulate(&coord_index).map_err(|bad| self.error(format!("coordIndex {bad} out of range")))?;
        if let Some(&bad) = polygons.iter().find(|&&i| i as usize >= points.len()) {
            return Err(self.error(format!("coordIndex {bad} out of range")));
        }

        let uvs = geometry
            .children()
            .find(|n| n.has_tag_name("TextureCoordinate"))
            .map(|t| self.floats(t.attribute("point").unwrap_or("")))
            .transpose()?
            .map(|f| f.chunks_exact(2).map(|c| [c[0], c[1]]).collect::<Vec<[f32; 2]>>());

        let Some(uvs) = uvs else {
            return Ok(ParsedMesh {
                positions: points,
                indices: Some(polygons),
                ..Default::default()
            });
        };

        // Separate texture indices force one vertex per triangle corner.
        let tex_index = match geometry.attribute("texCoordIndex") {
            Some(t) => triangulate(&self.ints(t)?)
                .map_err(|bad| self.error(format!("texCoordIndex {bad} out of range")))?,
            None => polygons.clone(),
        };
        if tex_index.len() != polygons.len() {
            return Err(self.error("texCoordIndex does not match coordIndex"));
        }
        let mut positions = Vec::with_capacity(polygons.len());
        let mut tex_coords = Vec::with_capacity(polygons.len());
        for (&p, &t) in polygons.iter().zip(&tex_index) {
            positions.push(points[p as usize]);
            let uv = uvs
                .get(t as usize)
                .copied()
                .ok_or_else(|| self.error(format!("texCoordIndex {t} out of range")))?;
            tex_coords.push(uv);
        }
        let count = positions.len() as u32;
        Ok(ParsedMesh {
            positions,
            tex_coords: Some(tex_coords),
            indices: Some((0..count).collect()),
            ..Default::default()
        })
    }

    fn viewpoint(&mut self, element: Node<'_, '_>, parent: usize) -> Result<(), AssetError> {
        let mut transform = Transform::from_position(self.vec3(element, "position")?.unwrap_or(Vec3::new(0.0, 0.0, 10.0)));
        if let Some(r) = self.rotation(element, "orientation")? {
            transform.rotation = r;
        }
        self.parsed.add_node(
            parent,
            ParsedNode {
                name: MAIN_CAMERA_NODE.to_string(),
                transform,
                camera: Some(CameraParams::default()),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn vec3(&self, element: Node<'_, '_>, attribute: &str) -> Result<Option<Vec3>, AssetError> {
        let Some(value) = element.attribute(attribute) else {
            return Ok(None);
        };
        match self.floats(value)?.as_slice() {
            [x, y, z] => Ok(Some(Vec3::new(*x, *y, *z))),
            _ => Err(self.error(format!("{attribute} needs three numbers"))),
        }
    }

    fn rotation(&self, element: Node<'_, '_>, attribute: &str) -> Result<Option<Quat>, AssetError> {
        let Some(value) = element.attribute(attribute) else {
            return Ok(None);
        };
        match self.floats(value)?.as_slice() {
            [x, y, z, angle] => {
                let axis = Vec3::new(*x, *y, *z);
                if axis.length_squared() == 0.0 {
                    Ok(None)
                } else {
                    Ok(Some(Quat::from_axis_angle(axis.normalize(), *angle)))
                }
            }
            _ => Err(self.error(format!("{attribute} needs four numbers"))),
        }
    }

    fn floats(&self, value: &str) -> Result<Vec<f32>, AssetError> {
        split_numbers(value)
            .map(|s| s.parse::<f32>().map_err(|_| self.error(format!("bad number '{s}'"))))
            .collect()
    }

    fn ints(&self, value: &str) -> Result<Vec<i64>, AssetError> {
        split_numbers(value)
            .map(|s| s.parse::<i64>().map_err(|_| self.error(format!("bad index '{s}'"))))
            .collect()
    }
}

fn split_numbers(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
}

/// Fan-triangulate `-1` separated polygons. Fails with the first index
/// that does not fit a `u32`.
fn triangulate(index: &[i64]) -> Result<Vec<u32>, i64> {
    let mut triangles = Vec::new();
    for polygon in index.split(|&i| i < 0) {
        if polygon.len() < 3 {
            continue;
        }
        let polygon = polygon
            .iter()
            .map(|&i| u32::try_from(i).map_err(|_| i))
            .collect::<Result<Vec<u32>, i64>>()?;
        for k in 1..polygon.len() - 1 {
            triangles.extend([polygon[0], polygon[k], polygon[k + 1]]);
        }
    }
    Ok(triangles)
}

/// First entry of an MFString such as `"a.png" "http://host/a.png"`.
fn first_url(value: &str) -> Option<&str> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('"') {
        rest.split('"').next().filter(|s| !s.is_empty())
    } else {
        value.split_whitespace().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::import::VolumeIo;
    use crate::volume::{MemoryVolume, ResourceVolume};

    const ROOM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<X3D profile="Interchange" version="3.3">
  <Scene>
    <Viewpoint position="0 1.6 4" orientation="0 1 0 0"/>
    <Transform DEF="table" translation="1 0 -2" scale="2 1 2">
      <Shape DEF="top">
        <Appearance>
          <Material diffuseColor="0.5 0.25 0" transparency="0.5"/>
          <ImageTexture url='"wood.png" "http://example.com/wood.png"'/>
        </Appearance>
        <IndexedFaceSet coordIndex="0 1 2 3 -1">
          <Coordinate point="0 0 0, 1 0 0, 1 0 1, 0 0 1"/>
          <TextureCoordinate point="0 0 1 0 1 1 0 1"/>
        </IndexedFaceSet>
      </Shape>
    </Transform>
    <Group DEF="empty"/>
    <Transform USE="table"/>
  </Scene>
</X3D>"#;

    fn import(source: &str) -> Result<Option<ParsedScene>, AssetError> {
        let volume: Arc<dyn ResourceVolume> =
            Arc::new(MemoryVolume::new("mem", "rooms/room.x3d").with_file("rooms/room.x3d", source));
        X3dLibrary.import_file("rooms/room.x3d", &ImportSettings::recommended(), &VolumeIo::new(volume))
    }

    #[test]
    fn parses_room() {
        let parsed = import(ROOM).unwrap().unwrap();
        let root = &parsed.nodes[0];
        assert_eq!(root.name, "room.x3d");
        assert_eq!(root.children.len(), 3);

        let camera = &parsed.nodes[root.children[0]];
        assert_eq!(camera.name, "MainCamera");
        assert_eq!(camera.transform.position, Vec3::new(0.0, 1.6, 4.0));
        assert!(camera.camera.is_some());

        let table = &parsed.nodes[root.children[1]];
        assert_eq!(table.name, "table");
        assert_eq!(table.transform.scale, Vec3::new(2.0, 1.0, 2.0));
        let top = &parsed.nodes[table.children[0]];
        let mesh = &parsed.meshes[top.meshes[0]];
        assert_eq!(mesh.positions.len(), 6);
        assert_eq!(mesh.tex_coords.as_ref().map(Vec::len), Some(6));

        let material = &parsed.materials[mesh.material.unwrap()];
        assert_eq!(material.diffuse, Color::rgba(0.5, 0.25, 0.0, 0.5));
        assert_eq!(material.textures[0].path, "rooms/wood.png");
    }

    #[test]
    fn no_scene_element_is_none() {
        assert!(import("<X3D/>").unwrap().is_none());
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let bad = r#"<X3D><Scene><Transform translation="1 x 2"/></Scene></X3D>"#;
        assert!(matches!(import(bad), Err(AssetError::Import(..))));
    }

    #[test]
    fn oversized_coord_index_is_rejected() {
        let bad = r#"<X3D><Scene><Shape>
            <IndexedFaceSet coordIndex="0 1 4294967298">
              <Coordinate point="0 0 0, 1 0 0, 1 0 1"/>
            </IndexedFaceSet>
        </Shape></Scene></X3D>"#;
        match import(bad) {
            Err(AssetError::Import(_, message)) => assert!(message.contains("4294967298"), "{message}"),
            other => panic!("expected import error, got {other:?}"),
        }
    }

    #[test]
    fn triangulates_polygons() {
        assert_eq!(triangulate(&[0, 1, 2, 3, -1, 4, 5, 6]), Ok(vec![0, 1, 2, 0, 2, 3, 4, 5, 6]));
        assert_eq!(triangulate(&[0, 1, 4_294_967_298]), Err(4_294_967_298));
        assert_eq!(first_url(r#""a.png" "b.png""#), Some("a.png"));
        assert_eq!(first_url("plain.png"), Some("plain.png"));
    }
}
