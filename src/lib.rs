//! Converts legacy BMD model files into binary glTF (GLB).

pub mod animation;
pub mod bmd;
pub mod config;
pub mod convert;
pub mod export;
pub mod math;
pub mod mesh;
pub mod texture;

/// Written to `asset.generator` of every emitted document.
pub const GENERATOR: &str = "bmd-tools";
