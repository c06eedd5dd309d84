//! Whole-model GLB export: geometry, materials, skin and animations into one
//! glTF document and one binary buffer.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use gltf::json as gltf_json;
use gltf_json::{
    accessor::{ComponentType, Type},
    mesh::{Mode, Semantic},
    validation::Checked,
    Index,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::builder::{
    component_size, GltfBuilder, TARGET_ARRAY_BUFFER, TARGET_ELEMENT_ARRAY_BUFFER,
};
use super::glb::encode_glb;
use super::material::MaterialTable;
use crate::animation::{add_animations, add_skin, compute_bone_fixups};
use crate::bmd::types::Model;
use crate::convert::context::ConversionContext;
use crate::mesh::{assemble, AssembledGeometry};

/// Index width switches to 32 bits above this many vertices.
pub const MAX_U16_VERTICES: usize = 65535;

const MISSING_TEXTURE_PREVIEW: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneStats {
    pub vertices: usize,
    pub triangles: usize,
    pub primitives: usize,
    pub materials: usize,
    pub skinned: bool,
    pub joints: usize,
    pub animations: usize,
    pub missing_textures: Vec<String>,
}

pub struct BuiltScene {
    pub root: gltf_json::Root,
    pub bin: Vec<u8>,
    pub stats: SceneStats,
}

/// Skinning needs one fixup per bone and every vertex bound to one of them.
fn skinning_enabled(model: &Model, fixup_count: usize, geometry: &AssembledGeometry) -> bool {
    fixup_count > 0 && fixup_count == model.bones.len() && geometry.vertex_nodes_resolved
}

/// Build the glTF document for `model`. `None` means the model has no
/// renderable geometry.
pub fn build_scene(model: &Model, ctx: &mut ConversionContext) -> Result<Option<BuiltScene>> {
    if model.triangle_count() == 0 {
        debug!(model = %model.name, meshes = model.meshes.len(), "no triangles");
        return Ok(None);
    }

    let fixups = compute_bone_fixups(model);
    let Some(geometry) = assemble(model, &fixups) else {
        debug!(model = %model.name, "no mesh produced indices");
        return Ok(None);
    };

    let skinned = skinning_enabled(model, fixups.len(), &geometry);
    if !fixups.is_empty() && !skinned {
        warn!(
            model = %model.name,
            bones = model.bones.len(),
            "vertex bone references unresolved, exporting static geometry"
        );
    }

    let mut builder = GltfBuilder::new();

    // Vertex streams
    let (min, max) = geometry.bounds();
    let position = builder.add_f32_accessor(
        &geometry.positions,
        Type::Vec3,
        TARGET_ARRAY_BUFFER,
        Some(json!(min)),
        Some(json!(max)),
        "position",
    );
    let normal = builder.add_f32_accessor(
        &geometry.normals,
        Type::Vec3,
        TARGET_ARRAY_BUFFER,
        None,
        None,
        "normal",
    );
    let texcoord = builder.add_f32_accessor(
        &geometry.texcoords,
        Type::Vec2,
        TARGET_ARRAY_BUFFER,
        None,
        None,
        "texcoord",
    );

    // One shared index view, one accessor per primitive
    let index_type = if geometry.vertex_count() > MAX_U16_VERTICES {
        ComponentType::U32
    } else {
        ComponentType::U16
    };
    let index_view = match index_type {
        ComponentType::U32 => builder.push_view(
            bytemuck::cast_slice(&geometry.indices),
            TARGET_ELEMENT_ARRAY_BUFFER,
            "indices",
        ),
        _ => {
            let narrow: Vec<u16> = geometry.indices.iter().map(|i| *i as u16).collect();
            builder.push_view(
                bytemuck::cast_slice(&narrow),
                TARGET_ELEMENT_ARRAY_BUFFER,
                "indices",
            )
        }
    };

    let skin_streams = if skinned {
        let joints = builder.add_packed_accessor(
            &geometry.joints,
            ComponentType::U16,
            Type::Vec4,
            TARGET_ARRAY_BUFFER,
            None,
            None,
            "joints",
        );
        let weights = builder.add_f32_accessor(
            &geometry.weights,
            Type::Vec4,
            TARGET_ARRAY_BUFFER,
            None,
            None,
            "weights",
        );
        Some((joints, weights))
    } else {
        None
    };

    // Primitives and materials
    let mut materials = MaterialTable::new(*ctx.alpha(), ctx.legacy_hint());
    let mut missing: BTreeSet<String> = BTreeSet::new();
    let mut primitives = Vec::with_capacity(geometry.primitives.len());

    for (primitive_index, primitive) in geometry.primitives.iter().enumerate() {
        let mesh = &model.meshes[primitive.mesh_index];

        let uri = match ctx.resolve_mesh_texture(&model.meshes, primitive.mesh_index) {
            Some(texture) if texture.found_on_disk => {
                materials.register_texture(&texture);
                Some(texture.uri)
            }
            Some(texture) => {
                missing.insert(texture.uri.clone());
                // an embedded asset must not point at files that do not exist
                (!ctx.embeds_textures()).then_some(texture.uri)
            }
            None => None,
        };
        let additive = ctx
            .legacy_hint()
            .is_some_and(|hint| hint.texture_slot == mesh.texture_slot);

        let indices = builder.add_accessor(
            index_view,
            primitive.index_offset * component_size(index_type),
            index_type,
            primitive.index_count,
            Type::Scalar,
            None,
            None,
            &format!("primitive{}_indices", primitive_index),
        );

        let mut attributes = BTreeMap::new();
        attributes.insert(Checked::Valid(Semantic::Positions), position);
        attributes.insert(Checked::Valid(Semantic::Normals), normal);
        attributes.insert(Checked::Valid(Semantic::TexCoords(0)), texcoord);
        if let Some((joints, weights)) = skin_streams {
            attributes.insert(Checked::Valid(Semantic::Joints(0)), joints);
            attributes.insert(Checked::Valid(Semantic::Weights(0)), weights);
        }

        let material = materials.ensure(&mut builder, uri.as_deref(), additive)?;

        primitives.push(gltf_json::mesh::Primitive {
            attributes,
            indices: Some(indices),
            material: Some(material),
            mode: Checked::Valid(Mode::Triangles),
            targets: None,
            extensions: None,
            extras: None,
        });
    }

    if !missing.is_empty() {
        let preview: Vec<&str> = missing
            .iter()
            .take(MISSING_TEXTURE_PREVIEW)
            .map(String::as_str)
            .collect();
        warn!(
            model = %model.name,
            count = missing.len(),
            "textures not found: {}",
            preview.join(", ")
        );
    }

    builder.meshes.push(gltf_json::Mesh {
        name: Some(model.name.clone()),
        primitives,
        weights: None,
        extensions: None,
        extras: None,
    });
    let mesh_node = builder.add_node(gltf_json::Node {
        mesh: Some(Index::new(0)),
        name: Some(model.name.clone()),
        ..Default::default()
    });
    let mut scene_nodes = vec![mesh_node];

    let mut animation_count = 0;
    if skinned {
        let skeleton = add_skin(&mut builder, model, &fixups, mesh_node);
        scene_nodes.extend(skeleton.roots.iter().copied());
        animation_count = add_animations(&mut builder, model, &skeleton)?;
    }

    let stats = SceneStats {
        vertices: geometry.vertex_count(),
        triangles: geometry.indices.len() / 3,
        primitives: geometry.primitives.len(),
        materials: builder.materials.len(),
        skinned,
        joints: if skinned { model.bones.len() } else { 0 },
        animations: animation_count,
        missing_textures: missing.into_iter().collect(),
    };

    let (root, bin) = builder.into_root(scene_nodes, &model.name);
    Ok(Some(BuiltScene { root, bin, stats }))
}

/// Escape every non-ASCII character as `\uXXXX` so the JSON chunk is pure
/// ASCII. Only string contents can hold such characters, so the document
/// stays equivalent.
pub fn escape_non_ascii(json: &str) -> String {
    if json.is_ascii() {
        return json.to_string();
    }
    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            out.push_str(&format!("\\u{:04x}", unit));
        }
    }
    out
}

/// Convert `model` into GLB bytes. `None` means nothing to emit.
pub fn build_glb(model: &Model, ctx: &mut ConversionContext) -> Result<Option<(Vec<u8>, SceneStats)>> {
    let Some(scene) = build_scene(model, ctx)? else {
        return Ok(None);
    };
    let json = serde_json::to_string_pretty(&scene.root)?;
    let bytes = encode_glb(&escape_non_ascii(&json), &scene.bin);
    Ok(Some((bytes, scene.stats)))
}
