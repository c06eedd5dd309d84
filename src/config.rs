//! Conversion options, loadable from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::bmd::ShortPayloadPolicy;
use crate::texture::{default_legacy_hints, AlphaThresholds, LegacyHint};

/// Outputs smaller than this cannot hold a meaningful scene.
pub const DEFAULT_MIN_OUTPUT_SIZE: usize = 128;
pub const DEFAULT_DELEGATED_TIMEOUT_SECS: u64 = 30;

/// Data-table files that share the `.bmd` extension but hold no model.
pub const NON_MODEL_STEMS: &[&str] = &[
    "item",
    "minimap",
    "itemsetting",
    "petdata",
    "gate",
    "movereq",
    "npcname",
    "quest",
    "skill",
    "filter",
    "dialog",
    "movelist",
    "serverlist",
    "chaosbox",
    "mixlist",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Embed found textures in the GLB instead of referencing them
    pub embed_textures: bool,
    /// Fallback texture tree searched after the output directory; defaults
    /// to the output root
    pub texture_root: Option<PathBuf>,
    pub short_payload: ShortPayloadPolicy,
    pub min_output_size: usize,
    /// External tool for version 0x0E payloads
    pub delegated_tool: Option<PathBuf>,
    pub delegated_timeout_secs: u64,
    pub legacy_additive_hints: Vec<LegacyHint>,
    pub alpha: AlphaThresholds,
    pub skip_non_model_stems: bool,
    pub overwrite: bool,
    /// Only convert files under these world/object numbers; empty means all
    pub worlds: Vec<u32>,
    /// Worker threads for batch conversion; 0 uses every core
    pub workers: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            embed_textures: true,
            texture_root: None,
            short_payload: ShortPayloadPolicy::Reject,
            min_output_size: DEFAULT_MIN_OUTPUT_SIZE,
            delegated_tool: None,
            delegated_timeout_secs: DEFAULT_DELEGATED_TIMEOUT_SECS,
            legacy_additive_hints: default_legacy_hints(),
            alpha: AlphaThresholds::default(),
            skip_non_model_stems: true,
            overwrite: false,
            worlds: Vec::new(),
            workers: 0,
        }
    }
}

impl ConvertOptions {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Invalid conversion config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("In {}", path.display()))
    }

    pub fn delegated_timeout(&self) -> Duration {
        Duration::from_secs(self.delegated_timeout_secs)
    }

    pub fn is_non_model_stem(&self, stem: &str) -> bool {
        self.skip_non_model_stems && NON_MODEL_STEMS.contains(&stem.to_ascii_lowercase().as_str())
    }
}

/// Parse a world token such as `74`, `World74` or `object74`.
pub fn parse_world_token(raw: &str) -> anyhow::Result<u32> {
    let token = raw.trim();
    if token.is_empty() {
        anyhow::bail!("empty world token");
    }
    numbered_dir("world", token)
        .or_else(|| numbered_dir("object", token))
        .or_else(|| token.parse().ok())
        .with_context(|| format!("invalid world token '{}', use values like '74' or 'World74'", raw))
}

/// Split comma-separated world lists, e.g. `["74,75", "World3"]`.
pub fn parse_world_filters<S: AsRef<str>>(raw: &[S]) -> anyhow::Result<Vec<u32>> {
    let mut worlds = Vec::new();
    for value in raw {
        for token in value.as_ref().split(',').filter(|t| !t.trim().is_empty()) {
            let world = parse_world_token(token)?;
            if !worlds.contains(&world) {
                worlds.push(world);
            }
        }
    }
    Ok(worlds)
}

/// `<prefix><digits>`, prefix case-insensitive.
pub fn numbered_dir(prefix: &str, name: &str) -> Option<u32> {
    let head = name.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let digits = &name[prefix.len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
