//! glTF document assembly and GLB container encoding.

pub mod builder;
pub mod glb;
pub mod material;
pub mod scene;

pub use glb::{encode_glb, read_glb_chunks, write_glb};
pub use scene::{build_glb, build_scene, BuiltScene, SceneStats};
