//! One glTF animation per BMD action, sampled at the source frame rate.

use anyhow::Result;
use gltf::json as gltf_json;
use gltf_json::{
    accessor::Type,
    animation::{Channel, Interpolation, Property, Sampler, Target},
    validation::Checked,
    Index,
};
use serde_json::{json, value::RawValue};

use super::skin::{local_pose, local_pose_to_trs, SkeletonNodes};
use crate::bmd::types::Model;
use crate::export::builder::GltfBuilder;

pub const FRAME_RATE: f32 = 30.0;

/// Keys closer than this to the first key count as unchanged.
pub const TRACK_EPSILON: f32 = 1e-6;

/// True when any key differs from the first by more than [`TRACK_EPSILON`].
pub fn track_varies<const N: usize>(values: &[[f32; N]]) -> bool {
    let Some((first, rest)) = values.split_first() else {
        return false;
    };
    rest.iter()
        .any(|value| value.iter().zip(first).any(|(a, b)| (a - b).abs() > TRACK_EPSILON))
}

fn keyframe_times(key_count: usize) -> Vec<f32> {
    (0..key_count).map(|k| k as f32 / FRAME_RATE).collect()
}

fn add_sampler_channel(
    samplers: &mut Vec<Sampler>,
    channels: &mut Vec<Channel>,
    input: Index<gltf_json::Accessor>,
    output: Index<gltf_json::Accessor>,
    node: Index<gltf_json::Node>,
    path: Property,
) {
    let sampler_index = samplers.len() as u32;
    samplers.push(Sampler {
        input,
        interpolation: Checked::Valid(Interpolation::Linear),
        output,
        extensions: None,
        extras: None,
    });
    channels.push(Channel {
        sampler: Index::new(sampler_index),
        target: Target {
            node,
            path: Checked::Valid(path),
            extensions: None,
            extras: None,
        },
        extensions: None,
        extras: None,
    });
}

/// Append animations for every action with keys. Bones whose translation and
/// rotation never change get no channels; actions left with no channels are
/// skipped. Returns the number of animations written.
pub fn add_animations(
    builder: &mut GltfBuilder,
    model: &Model,
    skeleton: &SkeletonNodes,
) -> Result<usize> {
    let mut written = 0;

    for (action_index, action) in model.actions.iter().enumerate() {
        let key_count = action.key_count;
        if key_count == 0 {
            continue;
        }

        let mut time_accessor = None;
        let mut samplers = Vec::new();
        let mut channels = Vec::new();

        for bone_index in 0..model.bones.len() {
            let (translations, rotations): (Vec<[f32; 3]>, Vec<[f32; 4]>) = (0..key_count)
                .map(|key| {
                    let (position, rotation) = local_pose(model, bone_index, action_index, key);
                    local_pose_to_trs(position, rotation)
                })
                .unzip();

            let translation_varies = track_varies(&translations);
            let rotation_varies = track_varies(&rotations);
            if !translation_varies && !rotation_varies {
                continue;
            }

            let input = *time_accessor.get_or_insert_with(|| {
                let times = keyframe_times(key_count);
                let (first, last) = (times[0], times[times.len() - 1]);
                builder.add_f32_accessor(
                    &times,
                    Type::Scalar,
                    None,
                    Some(json!([first])),
                    Some(json!([last])),
                    &format!("action{}_time", action_index),
                )
            });
            let node = skeleton.joint(bone_index);

            if translation_varies {
                let output = builder.add_f32_accessor(
                    &translations,
                    Type::Vec3,
                    None,
                    None,
                    None,
                    &format!("action{}_bone{}_translation", action_index, bone_index),
                );
                add_sampler_channel(
                    &mut samplers,
                    &mut channels,
                    input,
                    output,
                    node,
                    Property::Translation,
                );
            }
            if rotation_varies {
                let output = builder.add_f32_accessor(
                    &rotations,
                    Type::Vec4,
                    None,
                    None,
                    None,
                    &format!("action{}_bone{}_rotation", action_index, bone_index),
                );
                add_sampler_channel(
                    &mut samplers,
                    &mut channels,
                    input,
                    output,
                    node,
                    Property::Rotation,
                );
            }
        }

        if channels.is_empty() {
            continue;
        }

        let extras = if action.lock_positions {
            Some(RawValue::from_string(r#"{"lock_positions":true}"#.to_string())?)
        } else {
            None
        };

        builder.animations.push(gltf_json::Animation {
            channels,
            samplers,
            name: Some(format!("Action{:02}", action_index)),
            extensions: None,
            extras,
        });
        written += 1;
    }

    Ok(written)
}
