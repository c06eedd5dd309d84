// Synthetic BMD fixtures shared by the integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;

use binrw::BinWrite;
use bmd_tools_lib::bmd::decrypt::{encode_bmd, VersionTag};
use bmd_tools_lib::bmd::types::{
    Action, Bone, BoneTrack, Mesh, Model, Normal, TexCoord, Triangle, Vertex, NAME_LEN,
};

fn push_name(out: &mut Vec<u8>, name: &str) {
    let mut raw = [0u8; NAME_LEN];
    raw[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&raw);
}

fn push_records<T>(out: &mut Vec<u8>, records: &[T])
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    for record in records {
        record.write_le(&mut cursor).expect("write record");
    }
    out.extend_from_slice(&cursor.into_inner());
}

fn push_vec3s(out: &mut Vec<u8>, values: &[[f32; 3]]) {
    for value in values {
        for component in value {
            out.extend_from_slice(&component.to_le_bytes());
        }
    }
}

/// Serialize `model` into decrypted BMD structure bytes.
pub fn model_bytes(model: &Model) -> Vec<u8> {
    let mut out = Vec::new();
    push_name(&mut out, &model.name);
    out.extend_from_slice(&(model.meshes.len() as i16).to_le_bytes());
    out.extend_from_slice(&(model.bones.len() as i16).to_le_bytes());
    out.extend_from_slice(&(model.actions.len() as i16).to_le_bytes());

    for mesh in &model.meshes {
        for field in [
            mesh.vertices.len() as i16,
            mesh.normals.len() as i16,
            mesh.texcoords.len() as i16,
            mesh.triangles.len() as i16,
            mesh.texture_slot,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        push_records(&mut out, &mesh.vertices);
        push_records(&mut out, &mesh.normals);
        push_records(&mut out, &mesh.texcoords);
        push_records(&mut out, &mesh.triangles);
        push_name(&mut out, &mesh.texture_name);
    }

    for action in &model.actions {
        out.extend_from_slice(&(action.key_count as i16).to_le_bytes());
        out.push(action.lock_positions as u8);
        if let Some(positions) = &action.positions {
            push_vec3s(&mut out, positions);
        }
    }

    for bone in &model.bones {
        if bone.dummy {
            out.push(1);
            continue;
        }
        out.push(0);
        push_name(&mut out, &bone.name);
        out.extend_from_slice(&bone.parent.to_le_bytes());
        for track in &bone.tracks {
            push_vec3s(&mut out, &track.positions);
            push_vec3s(&mut out, &track.rotations);
        }
    }

    out
}

/// Full file bytes for `plain` structure bytes under the given cipher.
pub fn encode_plain(plain: &[u8], tag: VersionTag) -> Vec<u8> {
    encode_bmd(plain, tag).expect("encode BMD")
}

pub fn encode_model(model: &Model, tag: VersionTag) -> Vec<u8> {
    encode_plain(&model_bytes(model), tag)
}

/// Quad whose first two corners belong to bone 0 and last two to bone 1.
pub fn quad_mesh(texture_slot: i16, texture_name: &str) -> Mesh {
    let corners = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let uvs = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];

    Mesh {
        vertices: corners
            .iter()
            .enumerate()
            .map(|(i, position)| Vertex {
                node: (i / 2) as i16,
                position: *position,
            })
            .collect(),
        normals: (0..4)
            .map(|i| Normal {
                node: (i / 2) as i16,
                normal: [0.0, 0.0, 1.0],
                bind_vertex: i as i16,
            })
            .collect(),
        texcoords: uvs.iter().map(|(u, v)| TexCoord { u: *u, v: *v }).collect(),
        triangles: vec![Triangle {
            polygon: 4,
            vertex_index: [0, 1, 2, 3],
            normal_index: [0, 1, 2, 3],
            texcoord_index: [0, 1, 2, 3],
        }],
        texture_slot,
        texture_name: texture_name.to_string(),
    }
}

/// Root at (10,0,0) with a child at (0,5,0). The child moves along X in the
/// single two-key action.
pub fn rigged_quad(texture_slot: i16, texture_name: &str) -> Model {
    Model {
        name: "Rigged".into(),
        meshes: vec![quad_mesh(texture_slot, texture_name)],
        actions: vec![Action {
            key_count: 2,
            lock_positions: false,
            positions: None,
        }],
        bones: vec![
            Bone {
                name: "Root".into(),
                parent: -1,
                dummy: false,
                tracks: vec![BoneTrack {
                    positions: vec![[10.0, 0.0, 0.0]; 2],
                    rotations: vec![[0.0; 3]; 2],
                }],
            },
            Bone {
                name: "Arm".into(),
                parent: 0,
                dummy: false,
                tracks: vec![BoneTrack {
                    positions: vec![[0.0, 5.0, 0.0], [1.0, 5.0, 0.0]],
                    rotations: vec![[0.0; 3]; 2],
                }],
            },
        ],
    }
}

pub fn empty_model() -> Model {
    Model {
        name: "Empty".into(),
        ..Default::default()
    }
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    std::fs::create_dir_all(path.parent().expect("parent dir")).expect("create dirs");
    std::fs::write(path, bytes).expect("write fixture");
}

pub fn glb_json(bytes: &[u8]) -> serde_json::Value {
    let (json, _) = bmd_tools_lib::export::read_glb_chunks(bytes).expect("GLB chunks");
    serde_json::from_str(json).expect("JSON chunk")
}
