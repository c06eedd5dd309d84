use std::collections::{HashMap, HashSet};

use cgmath::Vector3;
use tracing::warn;

use crate::animation::fixup::BoneFixup;
use crate::bmd::types::{Mesh, Model};
use crate::math::{normalize_or_zero, swizzle_vec3};

/// Slice of the shared buffers produced by one source mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrimitive {
    pub mesh_index: usize,
    pub vertex_offset: usize,
    pub vertex_count: usize,
    /// Offset into `AssembledGeometry::indices`, in elements
    pub index_offset: usize,
    pub index_count: usize,
}

/// De-indexed, output-space geometry for a whole model. Positions and normals
/// are already swizzled to Y-up; indices are global.
#[derive(Debug, Clone, Default)]
pub struct AssembledGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub texcoords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// One joint per vertex with full weight
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
    pub primitives: Vec<AssembledPrimitive>,
    /// False if any emitted vertex named a bone with no fixup
    pub vertex_nodes_resolved: bool,
}

impl AssembledGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for p in &self.positions {
            for c in 0..3 {
                min[c] = min[c].min(p[c]);
                max[c] = max[c].max(p[c]);
            }
        }
        (min, max)
    }
}

#[derive(Default)]
struct MeshBuffers {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    joints: Vec<[u16; 4]>,
    indices: Vec<u32>,
}

/// Tracks which out-of-range bone nodes were already reported.
#[derive(Default)]
struct NodeWarnings {
    vertex: HashSet<i16>,
    normal: HashSet<i16>,
}

fn resolve_fixup<'a>(
    fixups: &'a [BoneFixup],
    node: i16,
    seen: &mut HashSet<i16>,
    kind: &str,
    model_name: &str,
) -> (&'a BoneFixup, bool) {
    if let Some(fixup) = usize::try_from(node).ok().and_then(|n| fixups.get(n)) {
        return (fixup, true);
    }
    if seen.insert(node) {
        warn!(
            model = model_name,
            node,
            bones = fixups.len(),
            "{} node out of range, clamping to 0",
            kind
        );
    }
    (&fixups[0], false)
}

/// Build one vertex/index set for every mesh that has triangles.
///
/// Returns `None` when no mesh contributes a single index.
pub fn assemble(model: &Model, fixups: &[BoneFixup]) -> Option<AssembledGeometry> {
    let mut out = AssembledGeometry {
        vertex_nodes_resolved: true,
        ..Default::default()
    };
    let mut warnings = NodeWarnings::default();

    for (mesh_index, mesh) in model.meshes.iter().enumerate() {
        if mesh.triangles.is_empty() {
            continue;
        }

        let buffers = assemble_mesh(
            mesh,
            fixups,
            &model.name,
            &mut warnings,
            &mut out.vertex_nodes_resolved,
        );
        if buffers.indices.is_empty() {
            continue;
        }

        let vertex_offset = out.positions.len();
        let index_offset = out.indices.len();
        let vertex_count = buffers.positions.len();
        let index_count = buffers.indices.len();

        out.positions.extend(buffers.positions);
        out.normals.extend(buffers.normals);
        out.texcoords.extend(buffers.texcoords);
        out.weights
            .extend(std::iter::repeat([1.0, 0.0, 0.0, 0.0]).take(vertex_count));
        out.joints.extend(buffers.joints);
        out.indices
            .extend(buffers.indices.iter().map(|i| i + vertex_offset as u32));

        out.primitives.push(AssembledPrimitive {
            mesh_index,
            vertex_offset,
            vertex_count,
            index_offset,
            index_count,
        });
    }

    if out.positions.is_empty() || out.indices.is_empty() {
        return None;
    }
    Some(out)
}

fn assemble_mesh(
    mesh: &Mesh,
    fixups: &[BoneFixup],
    model_name: &str,
    warnings: &mut NodeWarnings,
    nodes_resolved: &mut bool,
) -> MeshBuffers {
    let mut buffers = MeshBuffers::default();
    let mut vertex_map: HashMap<(usize, usize, usize), u32> = HashMap::new();

    let in_range = |index: i16, len: usize| usize::try_from(index).ok().filter(|i| *i < len);

    for tri in &mesh.triangles {
        let mut corners: Vec<u32> = Vec::with_capacity(4);

        for k in 0..tri.corner_count() {
            let (Some(vi), Some(ni), Some(ti)) = (
                in_range(tri.vertex_index[k], mesh.vertices.len()),
                in_range(tri.normal_index[k], mesh.normals.len()),
                in_range(tri.texcoord_index[k], mesh.texcoords.len()),
            ) else {
                continue;
            };

            if let Some(existing) = vertex_map.get(&(vi, ni, ti)) {
                corners.push(*existing);
                continue;
            }

            let vertex = &mesh.vertices[vi];
            let normal = &mesh.normals[ni];
            let texcoord = &mesh.texcoords[ti];

            let (world_pos, world_normal) = if fixups.is_empty() {
                (
                    Vector3::from(vertex.position),
                    normalize_or_zero(Vector3::from(normal.normal)),
                )
            } else {
                let (vertex_fixup, resolved) = resolve_fixup(
                    fixups,
                    vertex.node,
                    &mut warnings.vertex,
                    "Vertex",
                    model_name,
                );
                if !resolved {
                    *nodes_resolved = false;
                }
                let (normal_fixup, _) = resolve_fixup(
                    fixups,
                    normal.node,
                    &mut warnings.normal,
                    "Normal",
                    model_name,
                );
                (
                    vertex_fixup.world_position(vertex.position),
                    normal_fixup.world_normal(normal.normal),
                )
            };

            let joint = usize::try_from(vertex.node)
                .ok()
                .filter(|n| *n < fixups.len())
                .unwrap_or(0) as u16;

            let index = buffers.positions.len() as u32;
            vertex_map.insert((vi, ni, ti), index);
            buffers.positions.push(swizzle_vec3(world_pos).into());
            buffers
                .normals
                .push(normalize_or_zero(swizzle_vec3(world_normal)).into());
            buffers.texcoords.push([texcoord.u, texcoord.v]);
            buffers.joints.push([joint, 0, 0, 0]);
            corners.push(index);
        }

        // the axis swizzle flips handedness, so winding is reversed
        if corners.len() >= 3 {
            buffers
                .indices
                .extend_from_slice(&[corners[0], corners[2], corners[1]]);
        }
        if corners.len() >= 4 {
            buffers
                .indices
                .extend_from_slice(&[corners[0], corners[3], corners[2]]);
        }
    }

    buffers
}
