//! Bone rest transforms, skeleton nodes and keyframe animation export.

pub mod clip;
pub mod fixup;
pub mod skin;

pub use clip::add_animations;
pub use fixup::{compute_bone_fixups, BoneFixup};
pub use skin::{add_skin, SkeletonNodes};
