use binrw::binrw;

pub const MAX_MESHES: i16 = 50;
pub const MAX_BONES: i16 = 200;
pub const NAME_LEN: usize = 32;

/// Model header is the name plus three i16 counts.
pub const MODEL_HEADER_LEN: usize = NAME_LEN + 6;

pub const VERTEX_STRIDE: usize = 16;
pub const NORMAL_STRIDE: usize = 20;
pub const TEXCOORD_STRIDE: usize = 8;
pub const TRIANGLE_STRIDE: usize = 64;
pub const VEC3_STRIDE: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[binrw]
#[brw(little)]
pub struct Vertex {
    /// Index of the bone that owns this vertex
    pub node: i16,
    #[brw(pad_before = 2)]
    pub position: [f32; 3],
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[binrw]
#[brw(little)]
pub struct Normal {
    pub node: i16,
    #[brw(pad_before = 2)]
    pub normal: [f32; 3],
    #[brw(pad_after = 2)]
    pub bind_vertex: i16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[binrw]
#[brw(little)]
pub struct TexCoord {
    pub u: f32,
    pub v: f32,
}

/// 64-byte on-disk record. Only the first 26 bytes carry data, the rest are
/// lightmap fields nothing reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[binrw]
#[brw(little)]
pub struct Triangle {
    pub polygon: i8,
    #[brw(pad_before = 1)]
    pub vertex_index: [i16; 4],
    pub normal_index: [i16; 4],
    #[brw(pad_after = 38)]
    pub texcoord_index: [i16; 4],
}

impl Triangle {
    /// 3 or 4. Anything below 3 is treated as a triangle.
    pub fn corner_count(&self) -> usize {
        if self.polygon >= 3 {
            (self.polygon as usize).min(4)
        } else {
            3
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
#[binrw]
#[brw(little)]
pub struct MeshHeader {
    pub num_vertices: i16,
    pub num_normals: i16,
    pub num_texcoords: i16,
    pub num_triangles: i16,
    pub texture_slot: i16,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub normals: Vec<Normal>,
    pub texcoords: Vec<TexCoord>,
    pub triangles: Vec<Triangle>,
    /// May point at another mesh's texture name
    pub texture_slot: i16,
    pub texture_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct Action {
    pub key_count: usize,
    pub lock_positions: bool,
    /// Present only when `lock_positions` is set
    pub positions: Option<Vec<[f32; 3]>>,
}

/// Per-action keyframes for one bone. Rotations are Euler radians.
#[derive(Debug, Clone, Default)]
pub struct BoneTrack {
    pub positions: Vec<[f32; 3]>,
    pub rotations: Vec<[f32; 3]>,
}

impl BoneTrack {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.rotations.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bone {
    pub name: String,
    pub parent: i16,
    pub dummy: bool,
    /// One entry per action, empty for dummy bones
    pub tracks: Vec<BoneTrack>,
}

impl Bone {
    pub fn dummy(index: usize) -> Self {
        Self {
            name: format!("Null_{}", index),
            parent: -1,
            dummy: true,
            tracks: Vec::new(),
        }
    }

    /// Position and rotation of key 0 of action 0, zero when missing.
    pub fn rest_pose(&self) -> ([f32; 3], [f32; 3]) {
        match self.tracks.first() {
            Some(track) => (
                track.positions.first().copied().unwrap_or([0.0; 3]),
                track.rotations.first().copied().unwrap_or([0.0; 3]),
            ),
            None => ([0.0; 3], [0.0; 3]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<Mesh>,
    pub actions: Vec<Action>,
    pub bones: Vec<Bone>,
}

impl Model {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles.len()).sum()
    }
}

/// Decode a fixed-width NUL-terminated name. Non-ASCII bytes become U+FFFD.
pub fn decode_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| if b.is_ascii() { *b as char } else { '\u{FFFD}' })
        .collect()
}
