//! Rest-pose world transforms for every bone, computed once per model.

use cgmath::Vector3;

use crate::bmd::types::Model;
use crate::math::{angle_matrix, normalize_or_zero, radians_to_degrees, Transform3x4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneFixup {
    /// World rotation for action 0, key 0
    pub matrix: Transform3x4,
    pub origin: Vector3<f32>,
}

impl BoneFixup {
    pub fn identity() -> Self {
        Self {
            matrix: Transform3x4::identity(),
            origin: Vector3::new(0.0, 0.0, 0.0),
        }
    }

    pub fn world_position(&self, local: [f32; 3]) -> Vector3<f32> {
        self.matrix.transform(Vector3::from(local)) + self.origin
    }

    pub fn world_normal(&self, local: [f32; 3]) -> Vector3<f32> {
        normalize_or_zero(self.matrix.rotate(Vector3::from(local)))
    }
}

/// One fixup per bone, or nothing when the model has no bones or no actions.
///
/// Bones are visited in index order. A parent index that does not point at an
/// already-visited bone makes the bone a root; legacy assets depend on that.
pub fn compute_bone_fixups(model: &Model) -> Vec<BoneFixup> {
    if model.bones.is_empty() || model.actions.is_empty() {
        return Vec::new();
    }

    let mut fixups: Vec<BoneFixup> = Vec::with_capacity(model.bones.len());
    for bone in &model.bones {
        if bone.dummy || bone.tracks.is_empty() {
            fixups.push(BoneFixup::identity());
            continue;
        }

        let (position, rotation) = bone.rest_pose();
        let local = angle_matrix(radians_to_degrees(rotation));
        let position = Vector3::from(position);

        let parent = usize::try_from(bone.parent)
            .ok()
            .and_then(|p| fixups.get(p).copied());

        let fixup = match parent {
            Some(parent) => BoneFixup {
                matrix: parent.matrix.concat(&local),
                origin: parent.matrix.transform(position) + parent.origin,
            },
            None => BoneFixup {
                matrix: local,
                origin: position,
            },
        };
        fixups.push(fixup);
    }
    fixups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bmd::types::{Action, Bone, BoneTrack};
    use cgmath::InnerSpace;

    fn bone(name: &str, parent: i16, position: [f32; 3], rotation: [f32; 3]) -> Bone {
        Bone {
            name: name.to_string(),
            parent,
            dummy: false,
            tracks: vec![BoneTrack {
                positions: vec![position],
                rotations: vec![rotation],
            }],
        }
    }

    fn model(bones: Vec<Bone>) -> Model {
        Model {
            name: "test".into(),
            meshes: vec![],
            actions: vec![Action {
                key_count: 1,
                lock_positions: false,
                positions: None,
            }],
            bones,
        }
    }

    #[test]
    fn test_child_origin_accumulates() {
        let m = model(vec![
            bone("root", -1, [10.0, 0.0, 0.0], [0.0; 3]),
            bone("child", 0, [0.0, 5.0, 0.0], [0.0; 3]),
        ]);
        let fixups = compute_bone_fixups(&m);
        assert_eq!(fixups.len(), 2);
        assert!((fixups[1].origin - Vector3::new(10.0, 5.0, 0.0)).magnitude() < 0.0001);
    }

    #[test]
    fn test_parent_rotation_applies_to_child() {
        let half_pi = std::f32::consts::FRAC_PI_2;
        let m = model(vec![
            bone("root", -1, [0.0; 3], [0.0, 0.0, half_pi]),
            bone("child", 0, [1.0, 0.0, 0.0], [0.0; 3]),
        ]);
        let fixups = compute_bone_fixups(&m);
        assert!((fixups[1].origin - Vector3::new(0.0, 1.0, 0.0)).magnitude() < 0.0001);
    }

    #[test]
    fn test_forward_parent_falls_back_to_root() {
        let m = model(vec![
            bone("a", 1, [1.0, 2.0, 3.0], [0.0; 3]),
            bone("b", -1, [7.0, 0.0, 0.0], [0.0; 3]),
        ]);
        let fixups = compute_bone_fixups(&m);
        assert_eq!(fixups[0].origin, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_dummy_is_identity() {
        let m = model(vec![Bone::dummy(0), bone("b", 0, [1.0, 1.0, 1.0], [0.0; 3])]);
        let fixups = compute_bone_fixups(&m);
        assert_eq!(fixups[0], BoneFixup::identity());
        assert_eq!(fixups[1].origin, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_no_actions_means_no_fixups() {
        let mut m = model(vec![bone("root", -1, [1.0, 0.0, 0.0], [0.0; 3])]);
        m.actions.clear();
        assert!(compute_bone_fixups(&m).is_empty());
    }
}
