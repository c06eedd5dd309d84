//! glTF materials, images and textures for BMD primitives.

use std::collections::HashMap;

use anyhow::Result;
use gltf::json as gltf_json;
use gltf_json::{material::AlphaMode, validation::Checked, Index};
use serde::Serialize;
use serde_json::value::RawValue;

use super::builder::GltfBuilder;
use crate::texture::resolver::{mime_type_for, AlphaProfile, ResolvedTexture};
use crate::texture::{material_kind, AlphaThresholds, LegacyHint, MaterialKind};

/// Stored on additive materials so engines can restore the legacy blend.
#[derive(Serialize)]
struct LegacyBlendExtras {
    legacy_blend_mode: &'static str,
    legacy_blend_reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    legacy_texture_slot: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    legacy_object_dir: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    legacy_object_model: Option<u32>,
}

impl LegacyBlendExtras {
    fn for_hint(hint: Option<&LegacyHint>) -> Self {
        Self {
            legacy_blend_mode: "additive",
            legacy_blend_reason: "blend_mesh_texture_index",
            legacy_texture_slot: hint.map(|h| h.texture_slot),
            legacy_object_dir: hint.map(|h| h.object_dir),
            legacy_object_model: hint.map(|h| h.model_index),
        }
    }
}

/// Deduplicates materials by `(texture uri, additive)` for one output file.
pub struct MaterialTable {
    thresholds: AlphaThresholds,
    legacy_hint: Option<LegacyHint>,
    by_key: HashMap<(Option<String>, bool), Index<gltf_json::Material>>,
    alpha_by_uri: HashMap<String, AlphaProfile>,
    payload_by_uri: HashMap<String, Vec<u8>>,
    image_view_by_uri: HashMap<String, Index<gltf_json::buffer::View>>,
}

impl MaterialTable {
    pub fn new(thresholds: AlphaThresholds, legacy_hint: Option<LegacyHint>) -> Self {
        Self {
            thresholds,
            legacy_hint,
            by_key: HashMap::new(),
            alpha_by_uri: HashMap::new(),
            payload_by_uri: HashMap::new(),
            image_view_by_uri: HashMap::new(),
        }
    }

    /// Remember the alpha profile and embeddable payload of a texture found
    /// on disk. The first registration for a uri wins.
    pub fn register_texture(&mut self, texture: &ResolvedTexture) {
        self.alpha_by_uri
            .entry(texture.uri.clone())
            .or_insert(texture.alpha);
        if let Some(bytes) = &texture.bytes {
            self.payload_by_uri
                .entry(texture.uri.clone())
                .or_insert_with(|| bytes.clone());
        }
    }

    pub fn kind_for(&self, uri: Option<&str>, additive: bool) -> MaterialKind {
        let profile = uri.and_then(|u| self.alpha_by_uri.get(u));
        material_kind(additive, profile, &self.thresholds)
    }

    /// Index of the material for this texture/blend pair, creating it (and
    /// its image and texture) on first use.
    pub fn ensure(
        &mut self,
        builder: &mut GltfBuilder,
        uri: Option<&str>,
        additive: bool,
    ) -> Result<Index<gltf_json::Material>> {
        let key = (uri.map(str::to_string), additive);
        if let Some(index) = self.by_key.get(&key) {
            return Ok(*index);
        }

        let base_color_texture = match uri {
            Some(uri) => Some(self.push_texture(builder, uri)),
            None => None,
        };

        let kind = self.kind_for(uri, additive);
        let (alpha_mode, alpha_cutoff) = match kind {
            MaterialKind::Opaque => (AlphaMode::Opaque, None),
            MaterialKind::Mask { cutoff } => {
                (AlphaMode::Mask, Some(gltf_json::material::AlphaCutoff(cutoff)))
            }
            MaterialKind::Blend | MaterialKind::Additive => (AlphaMode::Blend, None),
        };
        let extras = match kind {
            MaterialKind::Additive => {
                let json =
                    serde_json::to_string(&LegacyBlendExtras::for_hint(self.legacy_hint.as_ref()))?;
                Some(RawValue::from_string(json)?)
            }
            _ => None,
        };

        let index = Index::new(builder.materials.len() as u32);
        builder.materials.push(gltf_json::Material {
            alpha_cutoff,
            alpha_mode: Checked::Valid(alpha_mode),
            double_sided: kind.double_sided(),
            pbr_metallic_roughness: gltf_json::material::PbrMetallicRoughness {
                base_color_factor: gltf_json::material::PbrBaseColorFactor([1.0, 1.0, 1.0, 1.0]),
                base_color_texture,
                metallic_factor: gltf_json::material::StrengthFactor(0.0),
                roughness_factor: gltf_json::material::StrengthFactor(1.0),
                metallic_roughness_texture: None,
                extensions: None,
                extras: None,
            },
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: gltf_json::material::EmissiveFactor([0.0, 0.0, 0.0]),
            extensions: None,
            extras,
            name: None,
        });
        self.by_key.insert(key, index);
        Ok(index)
    }

    /// New image + texture pair. Embedded payloads share one bufferView per uri.
    fn push_texture(&mut self, builder: &mut GltfBuilder, uri: &str) -> gltf_json::texture::Info {
        let image = match self.payload_by_uri.get(uri) {
            Some(payload) => {
                let view = match self.image_view_by_uri.get(uri) {
                    Some(view) => *view,
                    None => {
                        let view = builder.push_view(payload, None, uri);
                        self.image_view_by_uri.insert(uri.to_string(), view);
                        view
                    }
                };
                gltf_json::Image {
                    name: Some(uri.to_string()),
                    buffer_view: Some(view),
                    mime_type: Some(gltf_json::image::MimeType(mime_type_for(uri).to_string())),
                    uri: None,
                    extensions: None,
                    extras: None,
                }
            }
            None => gltf_json::Image {
                name: None,
                buffer_view: None,
                mime_type: None,
                uri: Some(uri.to_string()),
                extensions: None,
                extras: None,
            },
        };

        let image_index = builder.images.len() as u32;
        builder.images.push(image);

        let texture_index = builder.textures.len() as u32;
        builder.textures.push(gltf_json::Texture {
            name: None,
            sampler: None,
            source: Index::new(image_index),
            extensions: None,
            extras: None,
        });

        gltf_json::texture::Info {
            index: Index::new(texture_index),
            tex_coord: 0,
            extensions: None,
            extras: None,
        }
    }
}
