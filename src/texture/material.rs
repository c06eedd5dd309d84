//! Alpha classification and legacy additive hints for BMD materials.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::resolver::AlphaProfile;
use crate::config::numbered_dir;

/// How a primitive's material blends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialKind {
    Opaque,
    Mask { cutoff: f32 },
    Blend,
    /// Light-adding surface from the legacy client; rendered as blend
    Additive,
}

impl MaterialKind {
    pub fn double_sided(&self) -> bool {
        !matches!(self, MaterialKind::Opaque)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaThresholds {
    pub blend_partial_min: f64,
    pub blend_transparent_min: f64,
    pub blend_opaque_max: f64,
    /// MASK requires at least this much partial alpha
    pub mask_partial_min: f64,
    pub mask_cutoff: f32,
}

impl Default for AlphaThresholds {
    fn default() -> Self {
        Self {
            blend_partial_min: 0.35,
            blend_transparent_min: 0.02,
            blend_opaque_max: 0.20,
            mask_partial_min: 0.10,
            mask_cutoff: 0.35,
        }
    }
}

/// Pick opaque, mask or blend from a texture's alpha summary.
pub fn classify_alpha(profile: &AlphaProfile, thresholds: &AlphaThresholds) -> MaterialKind {
    if !profile.has_alpha {
        return MaterialKind::Opaque;
    }

    let transparent = profile.transparent_ratio;
    let opaque = profile.opaque_ratio;
    let partial = (1.0 - transparent - opaque).max(0.0);

    if profile.has_partial_alpha
        && transparent >= thresholds.blend_transparent_min
        && partial >= thresholds.blend_partial_min
        && opaque <= thresholds.blend_opaque_max
    {
        return MaterialKind::Blend;
    }

    if transparent > 0.0 || partial >= thresholds.mask_partial_min {
        return MaterialKind::Mask {
            cutoff: thresholds.mask_cutoff,
        };
    }

    MaterialKind::Opaque
}

/// `ObjectN/ObjectM.bmd` models whose mesh with texture slot `texture_slot`
/// draws additively in the legacy client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyHint {
    pub object_dir: u32,
    pub model_index: u32,
    pub texture_slot: i16,
}

pub fn default_legacy_hints() -> Vec<LegacyHint> {
    vec![
        LegacyHint {
            object_dir: 4,
            model_index: 40,
            texture_slot: 1,
        },
        LegacyHint {
            object_dir: 4,
            model_index: 42,
            texture_slot: 0,
        },
    ]
}

/// World object directory and model number encoded in a source path,
/// e.g. `.../Object4/Object40.bmd` gives `(4, 40)`.
pub fn legacy_identity_from_path(path: &Path) -> Option<(u32, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let model_index = numbered_dir("object", stem)?;

    path.parent()?
        .components()
        .rev()
        .filter_map(|c| c.as_os_str().to_str())
        .find_map(|name| numbered_dir("object", name))
        .map(|object_dir| (object_dir, model_index))
}

/// Hint for this model, if its identity is listed.
pub fn matching_legacy_hint(
    hints: &[LegacyHint],
    identity: Option<(u32, u32)>,
) -> Option<LegacyHint> {
    let (object_dir, model_index) = identity?;
    hints
        .iter()
        .find(|h| h.object_dir == object_dir && h.model_index == model_index)
        .copied()
}

/// Material kind for one primitive. The legacy additive flag wins over
/// whatever the texture's alpha says.
pub fn material_kind(
    additive: bool,
    profile: Option<&AlphaProfile>,
    thresholds: &AlphaThresholds,
) -> MaterialKind {
    if additive {
        return MaterialKind::Additive;
    }
    match profile {
        Some(profile) => classify_alpha(profile, thresholds),
        None => MaterialKind::Opaque,
    }
}
