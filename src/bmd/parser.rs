use std::io::Cursor;

use binrw::{BinRead, Endian, VecArgs};

use super::error::{BmdError, Result};
use super::types::*;

/// Bounds-checked cursor over decrypted BMD bytes. Every read is checked
/// against the remaining length first so truncation reports the structure
/// and offset instead of a generic EOF.
struct BmdReader<'a> {
    cursor: Cursor<&'a [u8]>,
    len: usize,
}

impl<'a> BmdReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            len: data.len(),
        }
    }

    fn offset(&self) -> usize {
        self.cursor.position() as usize
    }

    fn ensure(&self, need: usize, structure: impl FnOnce() -> String) -> Result<()> {
        let have = self.len.saturating_sub(self.offset());
        if need > have {
            return Err(BmdError::Truncated {
                structure: structure(),
                offset: self.offset(),
                need,
                have,
            });
        }
        Ok(())
    }

    fn read<T>(&mut self, size: usize, structure: impl FnOnce() -> String) -> Result<T>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        self.ensure(size, structure)?;
        let offset = self.offset();
        T::read_options(&mut self.cursor, Endian::Little, ()).map_err(|e| BmdError::Format(
            format!("read failed at offset {}: {}", offset, e),
        ))
    }

    fn read_vec<T>(
        &mut self,
        count: usize,
        stride: usize,
        structure: impl FnOnce() -> String,
    ) -> Result<Vec<T>>
    where
        T: for<'b> BinRead<Args<'b> = ()> + 'static,
    {
        self.ensure(count * stride, structure)?;
        let offset = self.offset();
        Vec::<T>::read_options(
            &mut self.cursor,
            Endian::Little,
            VecArgs {
                count,
                inner: (),
            },
        )
        .map_err(|e| BmdError::Format(format!("read failed at offset {}: {}", offset, e)))
    }

    fn read_name(&mut self, structure: impl FnOnce() -> String) -> Result<String> {
        let raw: [u8; NAME_LEN] = self.read(NAME_LEN, structure)?;
        Ok(decode_name(&raw))
    }
}

fn clamp_count(value: i16) -> usize {
    value.max(0) as usize
}

/// Parse decrypted BMD bytes into a [`Model`].
pub fn parse_model(data: &[u8]) -> Result<Model> {
    if data.len() < MODEL_HEADER_LEN {
        return Err(BmdError::format(format!(
            "BMD data too small for model header ({} < {})",
            data.len(),
            MODEL_HEADER_LEN
        )));
    }

    let mut reader = BmdReader::new(data);
    let name = reader.read_name(|| "Model header".into())?;
    let num_meshes: i16 = reader.read(2, || "Model header".into())?;
    let num_bones: i16 = reader.read(2, || "Model header".into())?;
    let num_actions: i16 = reader.read(2, || "Model header".into())?;

    if !(0..=MAX_MESHES).contains(&num_meshes) {
        return Err(BmdError::format(format!(
            "Mesh count out of range: {}",
            num_meshes
        )));
    }
    if !(0..=MAX_BONES).contains(&num_bones) {
        return Err(BmdError::format(format!(
            "Bone count out of range: {}",
            num_bones
        )));
    }
    if num_actions < 0 {
        return Err(BmdError::format(format!(
            "Action count out of range: {}",
            num_actions
        )));
    }

    let mut meshes = Vec::with_capacity(num_meshes as usize);
    for i in 0..num_meshes as usize {
        meshes.push(read_mesh(&mut reader, i)?);
    }

    let mut actions = Vec::with_capacity(num_actions as usize);
    for i in 0..num_actions as usize {
        actions.push(read_action(&mut reader, i)?);
    }

    let mut bones = Vec::with_capacity(num_bones as usize);
    for i in 0..num_bones as usize {
        bones.push(read_bone(&mut reader, i, &actions)?);
    }

    Ok(Model {
        name,
        meshes,
        actions,
        bones,
    })
}

fn read_mesh(reader: &mut BmdReader<'_>, i: usize) -> Result<Mesh> {
    let header: MeshHeader = reader.read(10, || format!("Mesh {} header", i))?;

    let vertices = reader.read_vec(
        clamp_count(header.num_vertices),
        VERTEX_STRIDE,
        || format!("Mesh {} vertices", i),
    )?;
    let normals = reader.read_vec(
        clamp_count(header.num_normals),
        NORMAL_STRIDE,
        || format!("Mesh {} normals", i),
    )?;
    let texcoords = reader.read_vec(
        clamp_count(header.num_texcoords),
        TEXCOORD_STRIDE,
        || format!("Mesh {} texcoords", i),
    )?;
    let triangles = reader.read_vec(
        clamp_count(header.num_triangles),
        TRIANGLE_STRIDE,
        || format!("Mesh {} triangles", i),
    )?;
    let texture_name = reader.read_name(|| format!("Mesh {} texture name", i))?;

    Ok(Mesh {
        vertices,
        normals,
        texcoords,
        triangles,
        texture_slot: header.texture_slot,
        texture_name,
    })
}

fn read_action(reader: &mut BmdReader<'_>, i: usize) -> Result<Action> {
    let key_count: i16 = reader.read(3, || format!("Action {} header", i))?;
    let lock: u8 = reader.read(1, || format!("Action {} header", i))?;
    let key_count = clamp_count(key_count);
    let lock_positions = lock != 0;

    let positions = if lock_positions {
        Some(reader.read_vec(key_count, VEC3_STRIDE, || {
            format!("Action {} positions", i)
        })?)
    } else {
        None
    };

    Ok(Action {
        key_count,
        lock_positions,
        positions,
    })
}

fn read_bone(reader: &mut BmdReader<'_>, i: usize, actions: &[Action]) -> Result<Bone> {
    let dummy: i8 = reader.read(1, || format!("Bone {} header", i))?;
    if dummy != 0 {
        return Ok(Bone::dummy(i));
    }

    reader.ensure(NAME_LEN + 2, || format!("Bone {} data", i))?;
    let name = reader.read_name(|| format!("Bone {} data", i))?;
    let parent: i16 = reader.read(2, || format!("Bone {} data", i))?;

    let mut tracks = Vec::with_capacity(actions.len());
    for (j, action) in actions.iter().enumerate() {
        let keys = action.key_count;
        reader.ensure(keys * VEC3_STRIDE * 2, || {
            format!("Bone {} action {} data", i, j)
        })?;
        let positions = reader.read_vec(keys, VEC3_STRIDE, || {
            format!("Bone {} action {} positions", i, j)
        })?;
        let rotations = reader.read_vec(keys, VEC3_STRIDE, || {
            format!("Bone {} action {} rotations", i, j)
        })?;
        tracks.push(BoneTrack {
            positions,
            rotations,
        });
    }

    Ok(Bone {
        name,
        parent,
        dummy: false,
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, meshes: i16, bones: i16, actions: i16) -> Vec<u8> {
        let mut out = vec![0u8; NAME_LEN];
        out[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&meshes.to_le_bytes());
        out.extend_from_slice(&bones.to_le_bytes());
        out.extend_from_slice(&actions.to_le_bytes());
        out
    }

    fn push_f32s(out: &mut Vec<u8>, values: &[f32]) {
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    #[test]
    fn test_header_too_small() {
        let err = parse_model(&[0u8; 37]).unwrap_err();
        assert!(matches!(err, BmdError::Format(_)));
    }

    #[test]
    fn test_empty_model() {
        let model = parse_model(&header("Empty", 0, 0, 0)).unwrap();
        assert_eq!(model.name, "Empty");
        assert!(model.meshes.is_empty());
        assert!(model.bones.is_empty());
    }

    #[test]
    fn test_counts_out_of_range() {
        assert!(parse_model(&header("m", 51, 0, 0)).is_err());
        assert!(parse_model(&header("m", -1, 0, 0)).is_err());
        assert!(parse_model(&header("m", 0, 201, 0)).is_err());
        assert!(parse_model(&header("m", 0, 0, -2)).is_err());
    }

    #[test]
    fn test_truncated_mesh_names_structure() {
        let mut data = header("m", 1, 0, 0);
        // claims 2 vertices, provides none
        for v in [2i16, 0, 0, 0, 0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        match parse_model(&data).unwrap_err() {
            BmdError::Truncated {
                structure,
                offset,
                need,
                ..
            } => {
                assert_eq!(structure, "Mesh 0 vertices");
                assert_eq!(offset, 48);
                assert_eq!(need, 32);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_negative_counts_clamped() {
        let mut data = header("m", 1, 0, 0);
        for v in [-5i16, -1, 0, 0, 0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[0u8; NAME_LEN]);
        let model = parse_model(&data).unwrap();
        assert!(model.meshes[0].vertices.is_empty());
        assert!(model.meshes[0].normals.is_empty());
    }

    #[test]
    fn test_mesh_records() {
        let mut data = header("m", 1, 0, 0);
        for v in [1i16, 1, 1, 1, 0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        // vertex
        data.extend_from_slice(&3i16.to_le_bytes());
        data.extend_from_slice(&[0, 0]);
        push_f32s(&mut data, &[1.0, 2.0, 3.0]);
        // normal
        data.extend_from_slice(&3i16.to_le_bytes());
        data.extend_from_slice(&[0, 0]);
        push_f32s(&mut data, &[0.0, 1.0, 0.0]);
        data.extend_from_slice(&7i16.to_le_bytes());
        data.extend_from_slice(&[0, 0]);
        // texcoord
        push_f32s(&mut data, &[0.25, 0.75]);
        // triangle
        let mut tri = vec![0u8; TRIANGLE_STRIDE];
        tri[0] = 4;
        for k in 0..4 {
            tri[2 + k * 2] = k as u8;
            tri[10 + k * 2] = 0;
            tri[18 + k * 2] = 0;
        }
        data.extend_from_slice(&tri);
        let mut tex = vec![0u8; NAME_LEN];
        tex[..9].copy_from_slice(b"skin1.jpg");
        data.extend_from_slice(&tex);

        let model = parse_model(&data).unwrap();
        let mesh = &model.meshes[0];
        assert_eq!(mesh.vertices[0].node, 3);
        assert_eq!(mesh.vertices[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(mesh.normals[0].normal, [0.0, 1.0, 0.0]);
        assert_eq!(mesh.normals[0].bind_vertex, 7);
        assert_eq!(mesh.texcoords[0].u, 0.25);
        assert_eq!(mesh.triangles[0].polygon, 4);
        assert_eq!(mesh.triangles[0].vertex_index, [0, 1, 2, 3]);
        assert_eq!(mesh.texture_name, "skin1.jpg");
    }

    #[test]
    fn test_actions_and_bones() {
        let mut data = header("m", 0, 2, 1);
        // action 0: 2 keys, locked
        data.extend_from_slice(&2i16.to_le_bytes());
        data.push(1);
        push_f32s(&mut data, &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        // bone 0: dummy
        data.push(1);
        // bone 1: real
        data.push(0);
        let mut name = vec![0u8; NAME_LEN];
        name[..4].copy_from_slice(b"Hand");
        data.extend_from_slice(&name);
        data.extend_from_slice(&0i16.to_le_bytes());
        push_f32s(&mut data, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        push_f32s(&mut data, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);

        let model = parse_model(&data).unwrap();
        assert!(model.actions[0].lock_positions);
        assert_eq!(model.actions[0].positions.as_ref().unwrap().len(), 2);
        assert!(model.bones[0].dummy);
        assert_eq!(model.bones[0].name, "Null_0");
        assert_eq!(model.bones[1].name, "Hand");
        assert_eq!(model.bones[1].tracks[0].positions[1], [4.0, 5.0, 6.0]);
        assert_eq!(model.bones[1].tracks[0].rotations[0], [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_truncated_bone_track() {
        let mut data = header("m", 0, 1, 1);
        data.extend_from_slice(&3i16.to_le_bytes());
        data.push(0);
        data.push(0);
        data.extend_from_slice(&[0u8; NAME_LEN]);
        data.extend_from_slice(&(-1i16).to_le_bytes());
        push_f32s(&mut data, &[0.0; 9]);

        let err = parse_model(&data).unwrap_err();
        assert!(err.to_string().contains("Bone 0 action 0 data"));
    }
}
