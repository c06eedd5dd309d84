//! Per-file conversion: raw BMD bytes in, a tagged outcome out.

pub mod batch;
pub mod context;

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::bmd::{self, external::DelegatedDecryptor, BmdError};
use crate::config::ConvertOptions;
use crate::export::{build_glb, SceneStats};
use crate::texture::{legacy_identity_from_path, matching_legacy_hint, TextureResolver};

pub use batch::{convert_file, convert_tree, ConversionStats, FailureRecord};
pub use context::ConversionContext;

/// Why one file could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionFailure {
    #[error("format error: {0}")]
    Format(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("export error: {0}")]
    Export(String),
}

impl ConversionFailure {
    /// Short label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionFailure::Format(_) => "format",
            ConversionFailure::Decryption(_) => "decryption",
            ConversionFailure::Validation(_) => "validation",
            ConversionFailure::Io(_) => "io",
            ConversionFailure::Export(_) => "export",
        }
    }
}

impl From<BmdError> for ConversionFailure {
    fn from(err: BmdError) -> Self {
        match err {
            BmdError::Format(_) | BmdError::Truncated { .. } => {
                ConversionFailure::Format(err.to_string())
            }
            BmdError::Decryption(msg) => ConversionFailure::Decryption(msg),
            BmdError::Io(e) => ConversionFailure::Io(e.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum ConversionOutcome {
    Converted { bytes: Vec<u8>, stats: SceneStats },
    /// Parsed fine but nothing has triangles.
    GeometryEmpty,
    Failed(ConversionFailure),
}

impl ConversionOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted { .. })
    }
}

/// Convert one file's bytes. `source_path` only feeds the legacy additive
/// identity lookup; nothing is read from or written to it.
pub fn convert_bytes(
    raw: &[u8],
    source_path: Option<&Path>,
    options: &ConvertOptions,
    resolver: &dyn TextureResolver,
    delegate: &dyn DelegatedDecryptor,
) -> ConversionOutcome {
    let model = match bmd::load_model(raw, options.short_payload, delegate) {
        Ok(model) => model,
        Err(e) => return ConversionOutcome::Failed(e.into()),
    };

    let legacy_hint = matching_legacy_hint(
        &options.legacy_additive_hints,
        source_path.and_then(legacy_identity_from_path),
    );
    if let Some(hint) = legacy_hint {
        debug!(
            object_dir = hint.object_dir,
            model_index = hint.model_index,
            texture_slot = hint.texture_slot,
            "legacy additive hint applies"
        );
    }

    let mut ctx = ConversionContext::new(resolver)
        .with_alpha(options.alpha)
        .with_legacy_hint(legacy_hint);

    let (bytes, stats) = match build_glb(&model, &mut ctx) {
        Ok(Some(built)) => built,
        Ok(None) => return ConversionOutcome::GeometryEmpty,
        Err(e) => return ConversionOutcome::Failed(ConversionFailure::Export(format!("{:#}", e))),
    };

    if bytes.len() < options.min_output_size {
        return ConversionOutcome::Failed(ConversionFailure::Validation(format!(
            "output too small: {} bytes (minimum {})",
            bytes.len(),
            options.min_output_size
        )));
    }

    debug!(
        model = %model.name,
        bytes = bytes.len(),
        vertices = stats.vertices,
        triangles = stats.triangles,
        "converted"
    );
    ConversionOutcome::Converted { bytes, stats }
}
