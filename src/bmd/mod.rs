//! Decoding of legacy BMD model files: version dispatch, ciphers and the
//! structural parser.

pub mod decrypt;
pub mod error;
pub mod external;
pub mod lea;
pub mod parser;
pub mod types;

pub use decrypt::{decrypt_bmd, ShortPayloadPolicy, VersionTag};
pub use error::{BmdError, Result};
pub use parser::parse_model;
pub use types::Model;

use external::DelegatedDecryptor;

/// Decrypt and parse a raw BMD file.
pub fn load_model(
    raw: &[u8],
    policy: ShortPayloadPolicy,
    delegate: &dyn DelegatedDecryptor,
) -> Result<Model> {
    let plain = decrypt_bmd(raw, policy, delegate)?;
    parse_model(&plain)
}
