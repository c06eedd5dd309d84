//! Tree conversion: discover `.bmd` files, convert them in parallel and
//! aggregate per-file results.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::Context;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::{convert_bytes, ConversionFailure, ConversionOutcome};
use crate::bmd::decrypt::BMD_MAGIC;
use crate::bmd::external::{DelegatedDecryptor, ProcessDecryptor, UnavailableDecryptor};
use crate::config::{numbered_dir, ConvertOptions};
use crate::export::write_glb;
use crate::texture::FsTextureResolver;

const PROGRESS_EVERY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub source: String,
    pub error: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub total_found: usize,
    pub converted: usize,
    pub skipped_no_geometry: usize,
    pub skipped_non_model: usize,
    pub skipped_existing: usize,
    pub skipped_corrupt: usize,
    pub failed: usize,
    pub failures: Vec<FailureRecord>,
}

impl ConversionStats {
    pub fn merge(&mut self, other: ConversionStats) {
        self.total_found += other.total_found;
        self.converted += other.converted;
        self.skipped_no_geometry += other.skipped_no_geometry;
        self.skipped_non_model += other.skipped_non_model;
        self.skipped_existing += other.skipped_existing;
        self.skipped_corrupt += other.skipped_corrupt;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }

    pub fn skipped(&self) -> usize {
        self.skipped_no_geometry + self.skipped_non_model + self.skipped_existing + self.skipped_corrupt
    }

    fn record_failure(&mut self, source: &Path, kind: &str, error: impl Into<String>) {
        self.failures.push(FailureRecord {
            source: source.display().to_string(),
            error: error.into(),
            kind: kind.to_string(),
        });
    }
}

/// Drop a leading `data` directory and lowercase `WorldN`/`ObjectN`
/// directory names, e.g. `Data/World01/Object40.bmd` -> `world1/Object40.bmd`.
pub fn canonicalize_output_rel_path(rel: &Path) -> PathBuf {
    let mut parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.first().is_some_and(|p| p.eq_ignore_ascii_case("data")) {
        parts.remove(0);
    }

    parts
        .into_iter()
        .map(|part| {
            if let Some(n) = numbered_dir("world", &part) {
                format!("world{}", n)
            } else if let Some(n) = numbered_dir("object", &part) {
                format!("object{}", n)
            } else {
                part
            }
        })
        .collect()
}

/// True when `worlds` is empty or any `worldN`/`objectN` component of `rel`
/// is listed.
pub fn path_matches_world_filter(rel: &Path, worlds: &[u32]) -> bool {
    if worlds.is_empty() {
        return true;
    }
    rel.components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter_map(|name| numbered_dir("world", name).or_else(|| numbered_dir("object", name)))
        .any(|n| worlds.contains(&n))
}

fn has_bmd_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bmd"))
}

fn rel_to_root<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

/// Every `.bmd` file under `root` (extension case-insensitive), sorted.
pub fn discover_bmd_files(root: &Path, worlds: &[u32]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && has_bmd_extension(entry.path()))
        .map(|entry| entry.into_path())
        .filter(|path| {
            path_matches_world_filter(&canonicalize_output_rel_path(rel_to_root(root, path)), worlds)
        })
        .collect();
    files.sort();
    files
}

pub fn output_path_for(input_root: &Path, output_root: &Path, source: &Path) -> PathBuf {
    let rel = canonicalize_output_rel_path(rel_to_root(input_root, source));
    output_root.join(rel).with_extension("glb")
}

/// (source, output) pairs for every file `convert_tree` would visit.
pub fn plan_tree(
    input_root: &Path,
    output_root: &Path,
    options: &ConvertOptions,
) -> Vec<(PathBuf, PathBuf)> {
    discover_bmd_files(input_root, &options.worlds)
        .into_iter()
        .map(|source| {
            let output = output_path_for(input_root, output_root, &source);
            (source, output)
        })
        .collect()
}

fn read_magic(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(BMD_MAGIC.len());
    File::open(path)?
        .take(BMD_MAGIC.len() as u64)
        .read_to_end(&mut header)?;
    Ok(header)
}

fn existing_output_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

/// Convert one file and write its GLB. Textures are looked up next to the
/// output first, then anywhere under the configured texture root or
/// `output_root`.
pub fn convert_file(
    source: &Path,
    output: &Path,
    output_root: &Path,
    options: &ConvertOptions,
    delegate: &dyn DelegatedDecryptor,
) -> ConversionStats {
    let mut stats = ConversionStats {
        total_found: 1,
        ..Default::default()
    };

    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if options.is_non_model_stem(stem) {
        debug!(source = %source.display(), "skipping data table");
        stats.skipped_non_model += 1;
        return stats;
    }

    match read_magic(source) {
        Ok(header) if header.as_slice() == BMD_MAGIC => {}
        Ok(header) => {
            debug!(source = %source.display(), magic = ?header, "skipping non-BMD file");
            stats.skipped_non_model += 1;
            return stats;
        }
        Err(e) => {
            error!(source = %source.display(), "cannot read: {}", e);
            stats.failed += 1;
            stats.record_failure(source, "io", e.to_string());
            return stats;
        }
    }

    if !options.overwrite
        && existing_output_size(output).is_some_and(|len| len >= options.min_output_size as u64)
    {
        debug!(output = %output.display(), "skipping existing");
        stats.skipped_existing += 1;
        return stats;
    }

    let raw = match std::fs::read(source) {
        Ok(raw) => raw,
        Err(e) => {
            error!(source = %source.display(), "cannot read: {}", e);
            stats.failed += 1;
            stats.record_failure(source, "io", e.to_string());
            return stats;
        }
    };

    let texture_dir = output.parent().unwrap_or(output_root);
    let fallback_root = options.texture_root.as_deref().unwrap_or(output_root);
    let resolver = FsTextureResolver::new(texture_dir, options.embed_textures)
        .with_fallback_root(fallback_root);

    match convert_bytes(&raw, Some(source), options, &resolver, delegate) {
        ConversionOutcome::Converted { bytes, stats: scene } => match write_glb(&bytes, output) {
            Ok(()) => {
                debug!(
                    source = %source.display(),
                    output = %output.display(),
                    bytes = bytes.len(),
                    triangles = scene.triangles,
                    animations = scene.animations,
                    "converted"
                );
                stats.converted += 1;
            }
            Err(e) => {
                error!(output = %output.display(), "{:#}", e);
                stats.failed += 1;
                stats.record_failure(source, "io", format!("{:#}", e));
            }
        },
        ConversionOutcome::GeometryEmpty => {
            debug!(source = %source.display(), "no geometry");
            stats.skipped_no_geometry += 1;
        }
        ConversionOutcome::Failed(
            failure @ (ConversionFailure::Format(_) | ConversionFailure::Decryption(_)),
        ) => {
            warn!(source = %source.display(), "parse error: {}", failure);
            stats.skipped_corrupt += 1;
            stats.record_failure(source, "parse", failure.to_string());
        }
        ConversionOutcome::Failed(failure) => {
            warn!(source = %source.display(), "conversion failed: {}", failure);
            stats.failed += 1;
            stats.record_failure(source, failure.kind(), failure.to_string());
        }
    }

    stats
}

/// Process-backed decryptor when a tool is configured.
pub fn delegate_for(options: &ConvertOptions) -> Box<dyn DelegatedDecryptor> {
    match &options.delegated_tool {
        Some(tool) => Box::new(ProcessDecryptor::new(tool, options.delegated_timeout())),
        None => Box::new(UnavailableDecryptor),
    }
}

/// Running totals shared by the workers of one tree conversion.
#[derive(Debug, Default)]
struct Progress {
    done: AtomicUsize,
    converted: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl Progress {
    /// Count one finished file and return how many are done.
    fn record(&self, stats: &ConversionStats) -> usize {
        self.converted.fetch_add(stats.converted, Ordering::Relaxed);
        self.skipped.fetch_add(stats.skipped(), Ordering::Relaxed);
        self.failed.fetch_add(stats.failed, Ordering::Relaxed);
        self.done.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn log(&self, done: usize, total: usize, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
        info!(
            "Progress: {}/{} ({:.1}%) converted={} skipped={} failed={} [{:.1} files/s, {:.1}s]",
            done,
            total,
            100.0 * done as f64 / total.max(1) as f64,
            self.converted.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            rate,
            elapsed
        );
    }
}

/// Convert every model under `input_root` into a mirrored tree of `.glb`
/// files under `output_root`.
pub fn convert_tree(
    input_root: &Path,
    output_root: &Path,
    options: &ConvertOptions,
) -> anyhow::Result<ConversionStats> {
    if !input_root.is_dir() {
        anyhow::bail!("Input directory not found: {}", input_root.display());
    }

    let jobs = plan_tree(input_root, output_root, options);
    let total = jobs.len();
    info!(
        "Found {} BMD files under {} (workers={})",
        total,
        input_root.display(),
        if options.workers == 0 { rayon::current_num_threads() } else { options.workers }
    );

    let delegate = delegate_for(options);
    let progress = Progress::default();
    let started = Instant::now();

    let run = || {
        jobs.par_iter()
            .map(|(source, output)| {
                let stats = convert_file(source, output, output_root, options, delegate.as_ref());
                let finished = progress.record(&stats);
                if finished % PROGRESS_EVERY == 0 {
                    progress.log(finished, total, started);
                }
                stats
            })
            .reduce(ConversionStats::default, |mut acc, stats| {
                acc.merge(stats);
                acc
            })
    };

    let mut stats = if options.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .context("Failed to build worker pool")?
            .install(run)
    } else {
        run()
    };
    stats.failures.sort_by(|a, b| a.source.cmp(&b.source));

    if total % PROGRESS_EVERY != 0 {
        progress.log(total, total, started);
    }
    info!(
        "Conversion complete: {} converted, {} skipped (no_geom={}, non_model={}, existing={}, corrupt={}), {} failed",
        stats.converted,
        stats.skipped(),
        stats.skipped_no_geometry,
        stats.skipped_non_model,
        stats.skipped_existing,
        stats.skipped_corrupt,
        stats.failed
    );
    Ok(stats)
}

#[derive(Serialize)]
struct BatchReport<'a> {
    #[serde(flatten)]
    stats: &'a ConversionStats,
    world_filter: Option<&'a [u32]>,
    embed_textures: bool,
}

/// Write `stats` as pretty JSON, creating parent directories.
pub fn write_report(path: &Path, stats: &ConversionStats, options: &ConvertOptions) -> anyhow::Result<()> {
    let report = BatchReport {
        stats,
        world_filter: (!options.worlds.is_empty()).then_some(options.worlds.as_slice()),
        embed_textures: options.embed_textures,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Plain (0x0A) file holding a model with no meshes.
    fn empty_model_bmd() -> Vec<u8> {
        let mut raw = b"BMD\x0A".to_vec();
        raw.extend_from_slice(&[0u8; 38]);
        raw
    }

    fn write(path: &Path, bytes: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_canonicalize_output_rel_path() {
        assert_eq!(
            canonicalize_output_rel_path(Path::new("Data/World01/Object40.bmd")),
            PathBuf::from("world1/Object40.bmd")
        );
        assert_eq!(
            canonicalize_output_rel_path(Path::new("Object4/OBJECT12/Tree.bmd")),
            PathBuf::from("object4/object12/Tree.bmd")
        );
        assert_eq!(canonicalize_output_rel_path(Path::new("data")), PathBuf::new());
        assert_eq!(
            canonicalize_output_rel_path(Path::new("Player/Worldly.bmd")),
            PathBuf::from("Player/Worldly.bmd")
        );
    }

    #[test]
    fn test_world_filter() {
        let rel = Path::new("world74/object3/Model.bmd");
        assert!(path_matches_world_filter(rel, &[]));
        assert!(path_matches_world_filter(rel, &[74]));
        assert!(path_matches_world_filter(rel, &[3]));
        assert!(!path_matches_world_filter(rel, &[1, 2]));
        assert!(!path_matches_world_filter(Path::new("Player/Object74.bmd"), &[74]));
    }

    #[test]
    fn test_discover_and_plan() {
        let input = TempDir::new().unwrap();
        let root = input.path();
        write(&root.join("Data/World2/Stone.BMD"), b"BMD");
        write(&root.join("Data/World1/Tree.bmd"), b"BMD");
        write(&root.join("Data/World1/readme.txt"), b"text");

        let all = discover_bmd_files(root, &[]);
        assert_eq!(all.len(), 2);
        assert!(all[0].ends_with("Data/World1/Tree.bmd"));

        let only_two = discover_bmd_files(root, &[2]);
        assert_eq!(only_two.len(), 1);
        assert!(only_two[0].ends_with("Stone.BMD"));

        let out = Path::new("/out");
        assert_eq!(
            output_path_for(root, out, &root.join("Data/World2/Stone.BMD")),
            PathBuf::from("/out/world2/Stone.glb")
        );
    }

    #[test]
    fn test_convert_file_skips() {
        let dir = TempDir::new().unwrap();
        let out_root = dir.path().join("out");
        let options = ConvertOptions::default();

        let table = dir.path().join("in/Item.bmd");
        write(&table, b"BMD\x0A");
        let stats = convert_file(&table, &out_root.join("Item.glb"), &out_root, &options, &UnavailableDecryptor);
        assert_eq!(stats.skipped_non_model, 1);

        let text = dir.path().join("in/Notes.bmd");
        write(&text, b"not a model");
        let stats = convert_file(&text, &out_root.join("Notes.glb"), &out_root, &options, &UnavailableDecryptor);
        assert_eq!(stats.skipped_non_model, 1);
        assert_eq!(stats.total_found, 1);

        let empty = dir.path().join("in/Empty.bmd");
        write(&empty, &empty_model_bmd());
        let stats = convert_file(&empty, &out_root.join("Empty.glb"), &out_root, &options, &UnavailableDecryptor);
        assert_eq!(stats.skipped_no_geometry, 1);
        assert!(!out_root.join("Empty.glb").exists());
    }

    #[test]
    fn test_corrupt_marker_counts_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Broken.bmd");
        write(&source, b"BMD\x00\x10\x00\x00\x00");

        let stats = convert_file(
            &source,
            &dir.path().join("Broken.glb"),
            dir.path(),
            &ConvertOptions::default(),
            &UnavailableDecryptor,
        );
        assert_eq!(stats.skipped_corrupt, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].kind, "parse");
    }

    #[test]
    fn test_existing_output_respected_unless_overwrite() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Model.bmd");
        let output = dir.path().join("Model.glb");
        write(&source, &empty_model_bmd());
        write(&output, &[0u8; 256]);

        let stats = convert_file(&source, &output, dir.path(), &ConvertOptions::default(), &UnavailableDecryptor);
        assert_eq!(stats.skipped_existing, 1);

        let overwrite = ConvertOptions {
            overwrite: true,
            ..ConvertOptions::default()
        };
        let stats = convert_file(&source, &output, dir.path(), &overwrite, &UnavailableDecryptor);
        assert_eq!(stats.skipped_existing, 0);
        assert_eq!(stats.skipped_no_geometry, 1);
    }

    #[test]
    fn test_progress_tracks_running_counts() {
        let progress = Progress::default();
        let converted = ConversionStats {
            total_found: 1,
            converted: 1,
            ..Default::default()
        };
        let corrupt = ConversionStats {
            total_found: 1,
            skipped_corrupt: 1,
            ..Default::default()
        };
        let failed = ConversionStats {
            total_found: 1,
            failed: 1,
            ..Default::default()
        };

        assert_eq!(progress.record(&converted), 1);
        assert_eq!(progress.record(&corrupt), 2);
        assert_eq!(progress.record(&failed), 3);
        assert_eq!(progress.record(&converted), 4);

        assert_eq!(progress.converted.load(Ordering::Relaxed), 2);
        assert_eq!(progress.skipped.load(Ordering::Relaxed), 1);
        assert_eq!(progress.failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_merge_and_report() {
        let mut total = ConversionStats::default();
        total.merge(ConversionStats {
            total_found: 2,
            converted: 1,
            skipped_corrupt: 1,
            failures: vec![FailureRecord {
                source: "a.bmd".into(),
                error: "bad".into(),
                kind: "parse".into(),
            }],
            ..Default::default()
        });
        total.merge(ConversionStats {
            total_found: 1,
            failed: 1,
            ..Default::default()
        });
        assert_eq!(total.total_found, 3);
        assert_eq!(total.skipped(), 1);
        assert_eq!(total.failures.len(), 1);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/run.json");
        let options = ConvertOptions {
            worlds: vec![74],
            ..ConvertOptions::default()
        };
        write_report(&path, &total, &options).unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(report["total_found"], 3);
        assert_eq!(report["world_filter"], serde_json::json!([74]));
        assert_eq!(report["failures"][0]["type"], "parse");
    }

    #[test]
    fn test_convert_tree_requires_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(convert_tree(&missing, dir.path(), &ConvertOptions::default()).is_err());
    }
}
