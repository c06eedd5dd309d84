//! GLB (Binary glTF) container encoding.
//!
//! Packs a glTF JSON string and binary buffer into the standard GLB format:
//! - 12-byte file header (magic, version 2, total length)
//! - JSON chunk (type 0x4E4F534A, padded to 4-byte alignment with spaces)
//! - BIN chunk (type 0x004E4942, padded to 4-byte alignment with \0)

use std::path::Path;

use anyhow::{bail, Context, Result};

pub const GLB_MAGIC: u32 = 0x46546C67; // "glTF"
pub const GLB_VERSION: u32 = 2;
pub const GLB_HEADER_SIZE: u32 = 12;
pub const CHUNK_HEADER_SIZE: u32 = 8;
pub const CHUNK_TYPE_JSON: u32 = 0x4E4F534A;
pub const CHUNK_TYPE_BIN: u32 = 0x004E4942;

fn padding_for(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Encode a GLB from a glTF JSON string and binary buffer.
pub fn encode_glb(json_str: &str, bin_data: &[u8]) -> Vec<u8> {
    let json_bytes = json_str.as_bytes();

    let json_padding = padding_for(json_bytes.len());
    let json_chunk_length = json_bytes.len() + json_padding;

    let bin_padding = padding_for(bin_data.len());
    let bin_chunk_length = bin_data.len() + bin_padding;

    let total_length = GLB_HEADER_SIZE as usize
        + CHUNK_HEADER_SIZE as usize
        + json_chunk_length
        + CHUNK_HEADER_SIZE as usize
        + bin_chunk_length;

    let mut out = Vec::with_capacity(total_length);

    // File header
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total_length as u32).to_le_bytes());

    // JSON chunk
    out.extend_from_slice(&(json_chunk_length as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TYPE_JSON.to_le_bytes());
    out.extend_from_slice(json_bytes);
    out.resize(out.len() + json_padding, 0x20);

    // BIN chunk
    out.extend_from_slice(&(bin_chunk_length as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_TYPE_BIN.to_le_bytes());
    out.extend_from_slice(bin_data);
    out.resize(out.len() + bin_padding, 0x00);

    out
}

/// Split a GLB into its JSON text and BIN payload, checking the header.
pub fn read_glb_chunks(data: &[u8]) -> Result<(&str, &[u8])> {
    if data.len() < (GLB_HEADER_SIZE + CHUNK_HEADER_SIZE) as usize {
        bail!("GLB payload too small ({} bytes)", data.len());
    }
    let word = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);

    if word(0) != GLB_MAGIC {
        bail!("invalid GLB magic");
    }
    if word(4) != GLB_VERSION {
        bail!("unsupported GLB version: {}", word(4));
    }
    if word(8) as usize > data.len() {
        bail!("GLB truncated");
    }
    if word(16) != CHUNK_TYPE_JSON {
        bail!("GLB missing JSON chunk");
    }

    let json_start = (GLB_HEADER_SIZE + CHUNK_HEADER_SIZE) as usize;
    let json_end = json_start + word(12) as usize;
    if json_end > data.len() {
        bail!("GLB JSON chunk truncated");
    }
    let json = std::str::from_utf8(&data[json_start..json_end])
        .context("GLB JSON chunk is not UTF-8")?
        .trim_end_matches([' ', '\0']);

    let bin_header = json_end;
    if bin_header + CHUNK_HEADER_SIZE as usize > data.len() {
        return Ok((json, &[]));
    }
    if word(bin_header + 4) != CHUNK_TYPE_BIN {
        bail!("GLB second chunk is not BIN");
    }
    let bin_start = bin_header + CHUNK_HEADER_SIZE as usize;
    let bin_end = bin_start + word(bin_header) as usize;
    if bin_end > data.len() {
        bail!("GLB BIN chunk truncated");
    }
    Ok((json, &data[bin_start..bin_end]))
}

/// Write GLB bytes to disk, creating parent directories.
pub fn write_glb(bytes: &[u8], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write GLB: {}", path.display()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_u32(data: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    }

    #[test]
    fn test_encode_glb_valid_header() {
        let json = r#"{"asset":{"version":"2.0"}}"#;
        let bin = vec![0u8; 16];

        let data = encode_glb(json, &bin);

        assert_eq!(read_u32(&data, 0), GLB_MAGIC);
        assert_eq!(read_u32(&data, 4), 2);
        // total length matches byte length
        assert_eq!(read_u32(&data, 8) as usize, data.len());
        assert_eq!(read_u32(&data, 16), CHUNK_TYPE_JSON);
    }

    #[test]
    fn test_encode_glb_alignment() {
        // 25 bytes of JSON needs 3 bytes padding
        let json = r#"{"asset":{"version":"2"}}"#;
        // 5 bytes of BIN needs 3 bytes padding
        let bin = vec![1, 2, 3, 4, 5];

        let data = encode_glb(json, &bin);
        assert_eq!(data.len() % 4, 0);

        let json_chunk_len = read_u32(&data, 12) as usize;
        assert_eq!(json_chunk_len % 4, 0);
        assert_eq!(json_chunk_len, 28);
        // JSON padding is spaces
        assert_eq!(&data[20 + 25..20 + 28], b"   ");

        let bin_header = 20 + json_chunk_len;
        assert_eq!(read_u32(&data, bin_header), 8);
        assert_eq!(read_u32(&data, bin_header + 4), CHUNK_TYPE_BIN);
        assert_eq!(&data[bin_header + 8 + 5..], &[0, 0, 0]);
    }

    #[test]
    fn test_read_back_chunks() {
        let json = r#"{"asset":{"version":"2.0"}}"#;
        let data = encode_glb(json, &[9, 8, 7, 6]);
        let (json_out, bin_out) = read_glb_chunks(&data).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(json_out).unwrap();
        assert_eq!(parsed["asset"]["version"], "2.0");
        assert_eq!(bin_out, &[9, 8, 7, 6]);
    }

    #[test]
    fn test_read_rejects_bad_magic() {
        let mut data = encode_glb("{}", &[]);
        data[0] = b'x';
        assert!(read_glb_chunks(&data).is_err());
        assert!(read_glb_chunks(&data[..10]).is_err());
    }

    #[test]
    fn test_write_glb_creates_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("out.glb");
        let data = encode_glb("{}", &[1, 2, 3, 4]);
        write_glb(&data, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }
}
