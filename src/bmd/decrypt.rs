use serde::{Deserialize, Serialize};

use super::error::{BmdError, Result};
use super::external::{DelegatedDecryptor, DELEGATED_HEADER};
use super::lea::{Lea256, BLOCK_SIZE};

pub const BMD_MAGIC: &[u8; 3] = b"BMD";

/// Magic + version tag + little-endian declared body size.
pub const SIZED_HEADER_LEN: usize = 8;

/// XOR key for the 0x0C rolling cipher
pub const ROLLING_XOR_KEY: [u8; 16] = [
    0xD1, 0x73, 0x52, 0xF6, 0xD2, 0x9A, 0xCB, 0x27, 0x3E, 0xAF, 0x59, 0x31, 0x37, 0xB3, 0xE7, 0xA2,
];
pub const ROLLING_XOR_SEED: u8 = 0x5E;
const ROLLING_XOR_STEP: u8 = 0x3D;

/// 256-bit key for the 0x0F block cipher
pub const LEA_KEY: [u8; 32] = [
    0xcc, 0x50, 0x45, 0x13, 0xc2, 0xa6, 0x57, 0x4e, 0xd6, 0x9a, 0x45, 0x89, 0xbf, 0x2f, 0xbc, 0xd9,
    0x39, 0xb3, 0xb3, 0xbd, 0x50, 0xbd, 0xcc, 0xb6, 0x85, 0x46, 0xd1, 0xd6, 0x16, 0x54, 0xe0, 0x87,
];

/// Byte 3 of a BMD file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTag {
    /// Known corrupt/empty marker
    Corrupt,
    Plain,
    RollingXor,
    Delegated,
    Lea,
}

impl VersionTag {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(VersionTag::Corrupt),
            0x0A => Ok(VersionTag::Plain),
            0x0C => Ok(VersionTag::RollingXor),
            0x0E => Ok(VersionTag::Delegated),
            0x0F => Ok(VersionTag::Lea),
            other => Err(BmdError::format(format!(
                "Unknown BMD version: 0x{:02X}",
                other
            ))),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            VersionTag::Corrupt => 0x00,
            VersionTag::Plain => 0x0A,
            VersionTag::RollingXor => 0x0C,
            VersionTag::Delegated => 0x0E,
            VersionTag::Lea => 0x0F,
        }
    }
}

/// What to do when the body is exactly one byte shorter than its declared size.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortPayloadPolicy {
    #[default]
    Reject,
    PadOneByte,
}

/// Raw file bytes split into tag and the bytes after the magic.
#[derive(Debug, Clone, Copy)]
pub struct EncodedPayload<'a> {
    pub tag: VersionTag,
    pub raw: &'a [u8],
}

impl<'a> EncodedPayload<'a> {
    pub fn from_bytes(raw: &'a [u8]) -> Result<Self> {
        if raw.len() < 4 {
            return Err(BmdError::format(format!("File too small: {} bytes", raw.len())));
        }
        if &raw[..3] != BMD_MAGIC {
            return Err(BmdError::format(format!(
                "Not a BMD file (magic: {:02X?})",
                &raw[..3]
            )));
        }
        let tag = VersionTag::from_byte(raw[3])?;
        Ok(Self { tag, raw })
    }

    /// Body after the magic, tag and size header. Trailing bytes past the
    /// declared size are ignored.
    pub fn sized_body(&self, policy: ShortPayloadPolicy) -> Result<Vec<u8>> {
        let raw = self.raw;
        if raw.len() < SIZED_HEADER_LEN {
            return Err(BmdError::decryption(
                "Encrypted BMD too small for size header",
            ));
        }
        let declared = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
        let need = SIZED_HEADER_LEN + declared;
        let have = raw.len();
        if have >= need {
            return Ok(raw[SIZED_HEADER_LEN..need].to_vec());
        }
        if have + 1 == need && policy == ShortPayloadPolicy::PadOneByte {
            tracing::warn!(need, have, "declared size one byte short, zero-padding");
            let mut body = raw[SIZED_HEADER_LEN..].to_vec();
            body.push(0);
            return Ok(body);
        }
        Err(BmdError::decryption(format!(
            "Encrypted BMD truncated (need {}, have {})",
            need, have
        )))
    }
}

/// One decoding strategy per version tag.
pub trait Decryptor {
    fn decrypt(&self, payload: &EncodedPayload<'_>) -> Result<Vec<u8>>;
}

pub struct PlainDecryptor;

impl Decryptor for PlainDecryptor {
    fn decrypt(&self, payload: &EncodedPayload<'_>) -> Result<Vec<u8>> {
        Ok(payload.raw[4..].to_vec())
    }
}

pub struct RollingXorDecryptor {
    pub policy: ShortPayloadPolicy,
}

impl Decryptor for RollingXorDecryptor {
    fn decrypt(&self, payload: &EncodedPayload<'_>) -> Result<Vec<u8>> {
        let mut body = payload.sized_body(self.policy)?;
        rolling_xor_decrypt(&mut body);
        Ok(body)
    }
}

pub struct LeaDecryptor {
    pub policy: ShortPayloadPolicy,
}

impl Decryptor for LeaDecryptor {
    fn decrypt(&self, payload: &EncodedPayload<'_>) -> Result<Vec<u8>> {
        let mut body = payload.sized_body(self.policy)?;
        if body.len() % BLOCK_SIZE != 0 {
            return Err(BmdError::decryption(format!(
                "LEA-256 encrypted BMD size must be 16-byte aligned (got {})",
                body.len()
            )));
        }
        Lea256::new(&LEA_KEY).decrypt_ecb(&mut body);
        Ok(body)
    }
}

/// Hands the sized body, re-tagged, to an external collaborator.
pub struct DelegatingDecryptor<'a> {
    pub policy: ShortPayloadPolicy,
    pub delegate: &'a dyn DelegatedDecryptor,
}

impl Decryptor for DelegatingDecryptor<'_> {
    fn decrypt(&self, payload: &EncodedPayload<'_>) -> Result<Vec<u8>> {
        let body = payload.sized_body(self.policy)?;
        let mut tagged = Vec::with_capacity(DELEGATED_HEADER.len() + body.len());
        tagged.extend_from_slice(DELEGATED_HEADER);
        tagged.extend_from_slice(&body);
        self.delegate.decrypt(&tagged).map_err(|e| match e {
            BmdError::Io(io) => BmdError::decryption(format!("delegated decryptor I/O: {}", io)),
            other => other,
        })
    }
}

/// Select the strategy for a tag. The corrupt marker has no strategy.
pub fn decryptor_for<'a>(
    tag: VersionTag,
    policy: ShortPayloadPolicy,
    delegate: &'a dyn DelegatedDecryptor,
) -> Result<Box<dyn Decryptor + 'a>> {
    match tag {
        VersionTag::Corrupt => Err(BmdError::format("Corrupt/empty BMD (version 0x00)")),
        VersionTag::Plain => Ok(Box::new(PlainDecryptor)),
        VersionTag::RollingXor => Ok(Box::new(RollingXorDecryptor { policy })),
        VersionTag::Lea => Ok(Box::new(LeaDecryptor { policy })),
        VersionTag::Delegated => Ok(Box::new(DelegatingDecryptor { policy, delegate })),
    }
}

/// Decode a whole BMD file into plaintext structural bytes.
pub fn decrypt_bmd(
    raw: &[u8],
    policy: ShortPayloadPolicy,
    delegate: &dyn DelegatedDecryptor,
) -> Result<Vec<u8>> {
    let payload = EncodedPayload::from_bytes(raw)?;
    decryptor_for(payload.tag, policy, delegate)?.decrypt(&payload)
}

/// Decrypt a 0x0C body in place.
///
/// out[i] = (in[i] ^ key[i % 16]) - k, where k starts at the seed and becomes
/// in[i] + 0x3D after each byte. The running key follows the ciphertext.
pub fn rolling_xor_decrypt(buffer: &mut [u8]) {
    let mut rolling = ROLLING_XOR_SEED;
    for (i, byte) in buffer.iter_mut().enumerate() {
        let cipher = *byte;
        *byte = (cipher ^ ROLLING_XOR_KEY[i % ROLLING_XOR_KEY.len()]).wrapping_sub(rolling);
        rolling = cipher.wrapping_add(ROLLING_XOR_STEP);
    }
}

/// Inverse of [`rolling_xor_decrypt`].
pub fn rolling_xor_encrypt(buffer: &mut [u8]) {
    let mut rolling = ROLLING_XOR_SEED;
    for (i, byte) in buffer.iter_mut().enumerate() {
        let cipher = byte.wrapping_add(rolling) ^ ROLLING_XOR_KEY[i % ROLLING_XOR_KEY.len()];
        *byte = cipher;
        rolling = cipher.wrapping_add(ROLLING_XOR_STEP);
    }
}

/// Wrap plaintext in a sized BMD container, encrypting per tag. Only the
/// in-process ciphers are supported.
pub fn encode_bmd(plain: &[u8], tag: VersionTag) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(plain.len() + SIZED_HEADER_LEN);
    out.extend_from_slice(BMD_MAGIC);
    out.push(tag.byte());
    match tag {
        VersionTag::Plain => out.extend_from_slice(plain),
        VersionTag::RollingXor => {
            let mut body = plain.to_vec();
            rolling_xor_encrypt(&mut body);
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(&body);
        }
        VersionTag::Lea => {
            let mut body = plain.to_vec();
            body.resize(body.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0);
            Lea256::new(&LEA_KEY).encrypt_ecb(&mut body);
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(&body);
        }
        VersionTag::Corrupt | VersionTag::Delegated => {
            return Err(BmdError::format(format!(
                "cannot encode version 0x{:02X}",
                tag.byte()
            )))
        }
    }
    Ok(out)
}
