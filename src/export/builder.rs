//! Accumulates glTF JSON objects and one packed binary buffer.

use bytemuck::Pod;
use gltf::json as gltf_json;
use gltf_json::{
    accessor::{ComponentType, GenericComponentType, Type},
    buffer::Target,
    validation::{Checked, USize64},
    Index,
};

/// Every bufferView starts on this boundary.
pub const VIEW_ALIGNMENT: usize = 4;

pub const TARGET_ARRAY_BUFFER: Option<Target> = Some(Target::ArrayBuffer);
pub const TARGET_ELEMENT_ARRAY_BUFFER: Option<Target> = Some(Target::ElementArrayBuffer);

pub fn component_size(component_type: ComponentType) -> usize {
    match component_type {
        ComponentType::I8 | ComponentType::U8 => 1,
        ComponentType::I16 | ComponentType::U16 => 2,
        ComponentType::U32 | ComponentType::F32 => 4,
    }
}

#[derive(Default)]
pub struct GltfBuilder {
    pub bin: Vec<u8>,
    pub buffer_views: Vec<gltf_json::buffer::View>,
    pub accessors: Vec<gltf_json::Accessor>,
    pub meshes: Vec<gltf_json::Mesh>,
    pub materials: Vec<gltf_json::Material>,
    pub nodes: Vec<gltf_json::Node>,
    pub images: Vec<gltf_json::Image>,
    pub textures: Vec<gltf_json::Texture>,
    pub skins: Vec<gltf_json::Skin>,
    pub animations: Vec<gltf_json::Animation>,
}

impl GltfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn pad_to_alignment(&mut self) {
        let padding = (VIEW_ALIGNMENT - self.bin.len() % VIEW_ALIGNMENT) % VIEW_ALIGNMENT;
        self.bin.extend(std::iter::repeat(0u8).take(padding));
    }

    /// Append `bytes` as a new bufferView, padding the buffer first so the
    /// view starts aligned.
    pub fn push_view(
        &mut self,
        bytes: &[u8],
        target: Option<Target>,
        name: &str,
    ) -> Index<gltf_json::buffer::View> {
        self.pad_to_alignment();
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);

        let index = Index::new(self.buffer_views.len() as u32);
        self.buffer_views.push(gltf_json::buffer::View {
            buffer: Index::new(0),
            byte_length: USize64(bytes.len() as u64),
            byte_offset: Some(USize64(offset as u64)),
            byte_stride: None,
            target: target.map(Checked::Valid),
            extensions: None,
            extras: None,
            name: Some(format!("{}_view", name)),
        });
        index
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_accessor(
        &mut self,
        view: Index<gltf_json::buffer::View>,
        byte_offset: usize,
        component_type: ComponentType,
        count: usize,
        type_: Type,
        min: Option<serde_json::Value>,
        max: Option<serde_json::Value>,
        name: &str,
    ) -> Index<gltf_json::Accessor> {
        let index = Index::new(self.accessors.len() as u32);
        self.accessors.push(gltf_json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(byte_offset as u64)),
            component_type: Checked::Valid(GenericComponentType(component_type)),
            count: USize64(count as u64),
            extensions: None,
            extras: None,
            max,
            min,
            name: Some(format!("{}_accessor", name)),
            normalized: false,
            sparse: None,
            type_: Checked::Valid(type_),
        });
        index
    }

    /// Push tightly packed `data` as its own view plus an accessor over it.
    #[allow(clippy::too_many_arguments)]
    pub fn add_packed_accessor<T: Pod>(
        &mut self,
        data: &[T],
        component_type: ComponentType,
        type_: Type,
        target: Option<Target>,
        min: Option<serde_json::Value>,
        max: Option<serde_json::Value>,
        name: &str,
    ) -> Index<gltf_json::Accessor> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let count = bytes.len() / (component_size(component_type) * type_.multiplicity());
        let view = self.push_view(bytes, target, name);
        self.add_accessor(view, 0, component_type, count, type_, min, max, name)
    }

    pub fn add_f32_accessor<T: Pod>(
        &mut self,
        data: &[T],
        type_: Type,
        target: Option<Target>,
        min: Option<serde_json::Value>,
        max: Option<serde_json::Value>,
        name: &str,
    ) -> Index<gltf_json::Accessor> {
        self.add_packed_accessor(data, ComponentType::F32, type_, target, min, max, name)
    }

    pub fn add_node(&mut self, node: gltf_json::Node) -> Index<gltf_json::Node> {
        let index = Index::new(self.nodes.len() as u32);
        self.nodes.push(node);
        index
    }

    /// Finish into a glTF root with one scene and one buffer covering `bin`.
    pub fn into_root(
        self,
        scene_nodes: Vec<Index<gltf_json::Node>>,
        scene_name: &str,
    ) -> (gltf_json::Root, Vec<u8>) {
        let buffer = gltf_json::Buffer {
            byte_length: USize64(self.bin.len() as u64),
            extensions: None,
            extras: None,
            name: None,
            uri: None,
        };

        let root = gltf_json::Root {
            asset: gltf_json::Asset {
                version: "2.0".to_string(),
                generator: Some(crate::GENERATOR.to_string()),
                ..Default::default()
            },
            scenes: vec![gltf_json::Scene {
                nodes: scene_nodes,
                name: Some(scene_name.to_string()),
                extensions: None,
                extras: None,
            }],
            scene: Some(Index::new(0)),
            nodes: self.nodes,
            buffers: vec![buffer],
            buffer_views: self.buffer_views,
            accessors: self.accessors,
            meshes: self.meshes,
            materials: self.materials,
            images: self.images,
            textures: self.textures,
            skins: self.skins,
            animations: self.animations,
            ..Default::default()
        };
        (root, self.bin)
    }
}
