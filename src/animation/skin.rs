//! Joint nodes, hierarchy and inverse bind matrices for skinned BMD models.

use gltf::json as gltf_json;
use gltf_json::{accessor::Type, scene::UnitQuaternion, Index, Node};

use super::fixup::BoneFixup;
use crate::bmd::types::{Bone, Model};
use crate::export::builder::GltfBuilder;
use crate::math::{
    matrix3_to_quaternion, matrix4_to_column_major, quaternion_to_xyzw, rigid_inverse,
    rotation_from_radians, swizzle_matrix3, swizzle_vec3,
};

/// Local position and Euler rotation (radians, source space) of a bone at one
/// key. Falls back to action 0's track, clamps the key, and gives zeros for
/// dummies or bones without pose data.
pub fn local_pose(
    model: &Model,
    bone_index: usize,
    action_index: usize,
    key_index: usize,
) -> ([f32; 3], [f32; 3]) {
    let Some(bone) = model.bones.get(bone_index) else {
        return ([0.0; 3], [0.0; 3]);
    };
    if bone.dummy || bone.tracks.is_empty() {
        return ([0.0; 3], [0.0; 3]);
    }

    let track = bone
        .tracks
        .get(action_index)
        .unwrap_or(&bone.tracks[0]);

    let clamp = |values: &[[f32; 3]]| match values.len() {
        0 => [0.0; 3],
        len => values[key_index.min(len - 1)],
    };
    (clamp(&track.positions), clamp(&track.rotations))
}

/// Source local pose to output translation + xyzw quaternion.
pub fn local_pose_to_trs(position: [f32; 3], rotation: [f32; 3]) -> ([f32; 3], [f32; 4]) {
    let rotation = swizzle_matrix3(rotation_from_radians(rotation));
    let quaternion = quaternion_to_xyzw(matrix3_to_quaternion(rotation));
    let translation = swizzle_vec3(position.into()).into();
    (translation, quaternion)
}

fn parent_of(bones: &[Bone], index: usize) -> Option<usize> {
    usize::try_from(bones[index].parent)
        .ok()
        .filter(|p| *p < bones.len() && *p != index)
}

/// Whether following parents upward from `parent` reaches `child`.
fn closes_cycle(bones: &[Bone], child: usize, parent: usize) -> bool {
    let mut current = parent;
    for _ in 0..bones.len() {
        if current == child {
            return true;
        }
        match parent_of(bones, current) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

/// Children per bone and the root list. A bone whose parent link would form a
/// cycle is treated as a root. With no roots at all, bone 0 becomes the root.
pub fn bone_hierarchy(bones: &[Bone]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut children = vec![Vec::new(); bones.len()];
    let mut roots = Vec::new();

    for child in 0..bones.len() {
        match parent_of(bones, child) {
            Some(parent) if !closes_cycle(bones, child, parent) => children[parent].push(child),
            _ => roots.push(child),
        }
    }

    if roots.is_empty() && !bones.is_empty() {
        roots.push(0);
    }
    (children, roots)
}

/// Scene roots and the first joint node of an exported skeleton.
pub struct SkeletonNodes {
    pub first_joint: u32,
    pub roots: Vec<Index<Node>>,
}

impl SkeletonNodes {
    pub fn joint(&self, bone_index: usize) -> Index<Node> {
        Index::new(self.first_joint + bone_index as u32)
    }
}

/// Append one node per bone, the inverse bind accessor and the skin, and bind
/// the skin to `mesh_node`. `fixups` must have one entry per bone.
pub fn add_skin(
    builder: &mut GltfBuilder,
    model: &Model,
    fixups: &[BoneFixup],
    mesh_node: Index<Node>,
) -> SkeletonNodes {
    let first_joint = builder.nodes.len() as u32;
    let (children, roots) = bone_hierarchy(&model.bones);

    for (bone_index, bone) in model.bones.iter().enumerate() {
        let (position, rotation) = local_pose(model, bone_index, 0, 0);
        let (translation, quaternion) = local_pose_to_trs(position, rotation);

        let name = match bone.name.trim() {
            "" => format!("Bone_{:03}", bone_index),
            trimmed => trimmed.to_string(),
        };
        let node_children: Vec<Index<Node>> = children[bone_index]
            .iter()
            .map(|c| Index::new(first_joint + *c as u32))
            .collect();

        builder.add_node(Node {
            name: Some(name),
            translation: Some(translation),
            rotation: Some(UnitQuaternion(quaternion)),
            children: if node_children.is_empty() {
                None
            } else {
                Some(node_children)
            },
            ..Default::default()
        });
    }

    let inverse_binds: Vec<[f32; 16]> = fixups
        .iter()
        .map(|fixup| {
            let rotation = swizzle_matrix3(fixup.matrix.rotation);
            let translation = swizzle_vec3(fixup.origin);
            matrix4_to_column_major(rigid_inverse(rotation, translation))
        })
        .collect();
    let inverse_bind_accessor =
        builder.add_f32_accessor(&inverse_binds, Type::Mat4, None, None, None, "inverse_bind");

    let root_nodes: Vec<Index<Node>> = roots
        .iter()
        .map(|r| Index::new(first_joint + *r as u32))
        .collect();

    builder.skins.push(gltf_json::Skin {
        inverse_bind_matrices: Some(inverse_bind_accessor),
        skeleton: root_nodes.first().copied(),
        joints: (0..model.bones.len())
            .map(|i| Index::new(first_joint + i as u32))
            .collect(),
        name: None,
        extensions: None,
        extras: None,
    });
    builder.nodes[mesh_node.value()].skin = Some(Index::new(0));

    SkeletonNodes {
        first_joint,
        roots: root_nodes,
    }
}
