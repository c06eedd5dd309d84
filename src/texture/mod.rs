pub mod material;
pub mod resolver;

pub use material::{
    classify_alpha, default_legacy_hints, legacy_identity_from_path, material_kind,
    matching_legacy_hint, AlphaThresholds, LegacyHint, MaterialKind,
};
pub use resolver::{
    AlphaProfile, FsTextureResolver, NameOnlyResolver, ResolvedTexture, TextureResolver,
};
