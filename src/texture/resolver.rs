//! Texture-name lookup. The converter core only sees the [`TextureResolver`]
//! trait; [`FsTextureResolver`] is the on-disk implementation used by the CLI.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use image::ImageFormat;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Summary of a texture's alpha channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaProfile {
    pub has_alpha: bool,
    pub has_partial_alpha: bool,
    /// Fraction of pixels with alpha 0
    pub transparent_ratio: f64,
    /// Fraction of pixels with alpha 255
    pub opaque_ratio: f64,
}

impl Default for AlphaProfile {
    fn default() -> Self {
        Self::opaque()
    }
}

impl AlphaProfile {
    pub fn opaque() -> Self {
        Self {
            has_alpha: false,
            has_partial_alpha: false,
            transparent_ratio: 0.0,
            opaque_ratio: 1.0,
        }
    }

    pub fn from_histogram(histogram: &[u64; 256]) -> Self {
        let total: u64 = histogram.iter().sum();
        if total == 0 || histogram[255] == total {
            return Self::opaque();
        }
        Self {
            has_alpha: true,
            has_partial_alpha: histogram[1..255].iter().any(|c| *c > 0),
            transparent_ratio: histogram[0] as f64 / total as f64,
            opaque_ratio: histogram[255] as f64 / total as f64,
        }
    }

    /// Decode image bytes and histogram their alpha channel. Images that fail
    /// to decode or carry no alpha count as opaque.
    pub fn from_image_bytes(bytes: &[u8], name_hint: &str) -> Self {
        let format = image::guess_format(bytes)
            .ok()
            .or_else(|| ImageFormat::from_path(name_hint).ok());
        let Some(format) = format else {
            return Self::opaque();
        };
        let img = match image::load_from_memory_with_format(bytes, format) {
            Ok(img) => img,
            Err(e) => {
                debug!(texture = name_hint, "alpha probe failed to decode: {}", e);
                return Self::opaque();
            }
        };
        if !img.color().has_alpha() {
            return Self::opaque();
        }

        let mut histogram = [0u64; 256];
        for pixel in img.to_rgba8().pixels() {
            histogram[pixel.0[3] as usize] += 1;
        }
        Self::from_histogram(&histogram)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTexture {
    pub uri: String,
    /// Image payload to embed, when embedding is on and the file was readable
    pub bytes: Option<Vec<u8>>,
    pub found_on_disk: bool,
    pub alpha: AlphaProfile,
}

impl ResolvedTexture {
    pub fn unresolved(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            bytes: None,
            found_on_disk: false,
            alpha: AlphaProfile::opaque(),
        }
    }
}

/// Maps a BMD texture name to a texture in the output asset tree.
pub trait TextureResolver: Send + Sync {
    /// `None` when the name yields no usable candidate at all. A candidate
    /// that does not exist on disk comes back with `found_on_disk == false`.
    fn resolve(&self, texture_name: &str) -> Option<ResolvedTexture>;

    /// Whether found textures are embedded in the container.
    fn embeds_textures(&self) -> bool;
}

/// Resolver that never touches the filesystem and never embeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameOnlyResolver;

impl TextureResolver for NameOnlyResolver {
    fn resolve(&self, texture_name: &str) -> Option<ResolvedTexture> {
        candidate_uris(texture_name)
            .into_iter()
            .next()
            .map(ResolvedTexture::unresolved)
    }

    fn embeds_textures(&self) -> bool {
        false
    }
}

/// Output file names a BMD texture name may have been migrated to, most
/// likely first.
pub fn candidate_uris(texture_name: &str) -> Vec<String> {
    let cleaned = texture_name.trim().replace('\\', "/");
    let Some(basename) = cleaned.rsplit('/').next().filter(|b| !b.is_empty()) else {
        return Vec::new();
    };
    let path = Path::new(basename);
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()).filter(|s| !s.is_empty())
    else {
        return Vec::new();
    };
    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let candidates = match suffix.as_str() {
        "tga" | "ozt" => vec![format!("{}.tga", stem), format!("{}.png", stem)],
        "jpg" | "jpeg" | "bmp" | "ozj" | "ozj2" | "ozb" | "ozp" | "png" => {
            vec![format!("{}.png", stem)]
        }
        _ => vec![format!("{}.png", stem), format!("{}.tga", stem)],
    };

    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.to_ascii_lowercase()))
        .collect()
}

pub fn mime_type_for(uri: &str) -> &'static str {
    let ext = Path::new(uri)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("tga") => "image/x-tga",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

/// Lowercase alphanumerics only, so `Tree_01` and `tree01` collide.
fn normalize_lookup_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn is_texture_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png") || e.eq_ignore_ascii_case("tga"))
}

/// Three lookup tables over a set of texture files. First file (sorted by
/// lowercase path) wins on collisions.
#[derive(Debug, Default)]
struct TextureIndex {
    by_lower_name: HashMap<String, PathBuf>,
    by_lower_stem: HashMap<String, PathBuf>,
    by_normalized_stem: HashMap<String, PathBuf>,
}

impl TextureIndex {
    fn build(mut files: Vec<PathBuf>) -> Self {
        files.sort_by_key(|p| p.to_string_lossy().to_lowercase());
        let mut index = Self::default();
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let normalized = normalize_lookup_key(&stem);

            index.by_lower_name.entry(name).or_insert_with(|| path.clone());
            index
                .by_lower_stem
                .entry(stem.to_lowercase())
                .or_insert_with(|| path.clone());
            if !normalized.is_empty() {
                index.by_normalized_stem.entry(normalized).or_insert(path);
            }
        }
        index
    }

    fn of_dir(dir: &Path) -> Self {
        let files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| is_texture_file(p))
                    .collect()
            })
            .unwrap_or_default();
        Self::build(files)
    }

    fn of_tree(root: &Path) -> Self {
        let files: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| is_texture_file(p))
            .collect();
        Self::build(files)
    }

    fn lookup(&self, uri: &str) -> Option<&PathBuf> {
        let lower_name = uri.to_lowercase();
        let stem = Path::new(uri)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let normalized = normalize_lookup_key(&stem);

        self.by_lower_name
            .get(&lower_name)
            .or_else(|| self.by_lower_stem.get(&stem.to_lowercase()))
            .or_else(|| {
                if normalized.is_empty() {
                    None
                } else {
                    self.by_normalized_stem.get(&normalized)
                }
            })
    }
}

/// Looks textures up in one directory, then recursively under a fallback root.
#[derive(Debug)]
pub struct FsTextureResolver {
    texture_dir: PathBuf,
    fallback_root: Option<PathBuf>,
    embed: bool,
    index: OnceLock<TextureIndex>,
    fallback_index: OnceLock<TextureIndex>,
}

impl FsTextureResolver {
    pub fn new(texture_dir: impl Into<PathBuf>, embed: bool) -> Self {
        Self {
            texture_dir: texture_dir.into(),
            fallback_root: None,
            embed,
            index: OnceLock::new(),
            fallback_index: OnceLock::new(),
        }
    }

    pub fn with_fallback_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.fallback_root = Some(root.into());
        self
    }

    pub fn texture_dir(&self) -> &Path {
        &self.texture_dir
    }

    fn find(&self, uri: &str) -> Option<PathBuf> {
        let direct = self.texture_dir.join(uri);
        if direct.is_file() {
            return Some(direct);
        }
        let index = self.index.get_or_init(|| TextureIndex::of_dir(&self.texture_dir));
        if let Some(path) = index.lookup(uri) {
            return Some(path.clone());
        }

        let root = self.fallback_root.as_ref()?;
        let direct = root.join(uri);
        if direct.is_file() {
            return Some(direct);
        }
        let fallback = self.fallback_index.get_or_init(|| TextureIndex::of_tree(root));
        fallback.lookup(uri).cloned()
    }

    fn uri_for(&self, path: &Path) -> String {
        if let Ok(rel) = path.strip_prefix(&self.texture_dir) {
            return to_uri(rel);
        }
        if self.embed {
            if let Some(rel) = self
                .fallback_root
                .as_ref()
                .and_then(|root| path.strip_prefix(root).ok())
            {
                return to_uri(rel);
            }
            return path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        relative_uri(&self.texture_dir, path)
    }
}

impl TextureResolver for FsTextureResolver {
    fn resolve(&self, texture_name: &str) -> Option<ResolvedTexture> {
        let candidates = candidate_uris(texture_name);
        let first = candidates.first()?.clone();

        for uri in &candidates {
            let Some(path) = self.find(uri) else {
                continue;
            };

            let payload = match std::fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(path = %path.display(), "failed to read texture: {}", e);
                    None
                }
            };
            let alpha = payload
                .as_deref()
                .map(|bytes| AlphaProfile::from_image_bytes(bytes, uri))
                .unwrap_or_default();

            return Some(ResolvedTexture {
                uri: self.uri_for(&path),
                bytes: if self.embed { payload } else { None },
                found_on_disk: true,
                alpha,
            });
        }

        Some(ResolvedTexture::unresolved(first))
    }

    fn embeds_textures(&self) -> bool {
        self.embed
    }
}

fn to_uri(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `target` relative to `base`, with `..` segments where needed.
fn relative_uri(base: &Path, target: &Path) -> String {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(base.len() - common)
        .collect();
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
