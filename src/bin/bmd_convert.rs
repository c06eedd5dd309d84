//! bmd-convert: convert legacy BMD models to GLB.
//!
//! ```bash
//! # Whole client tree, mirrored into ./glb
//! bmd-convert ./client/Data ./glb --world 74,75 --report report.json
//!
//! # One file
//! bmd-convert ./client/Data/Object4/Object40.bmd ./out/Object40.glb
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bmd_tools_lib::bmd::ShortPayloadPolicy;
use bmd_tools_lib::config::{parse_world_filters, ConvertOptions};
use bmd_tools_lib::convert::batch::{delegate_for, plan_tree, write_report};
use bmd_tools_lib::convert::{convert_file, convert_tree, ConversionStats};

#[derive(Parser)]
#[command(name = "bmd-convert")]
#[command(about = "Convert legacy BMD models to binary glTF (GLB)")]
#[command(version)]
struct Cli {
    /// A single .bmd file or a directory tree of them
    input: PathBuf,

    /// Output .glb file, or output directory
    output: PathBuf,

    /// TOML file with conversion options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra directory searched for textures
    #[arg(long)]
    texture_dir: Option<PathBuf>,

    /// Reference textures by URI instead of embedding them
    #[arg(long)]
    no_embed: bool,

    /// Re-convert files whose output already exists
    #[arg(long)]
    overwrite: bool,

    /// External decryptor for version 0x0E files
    #[arg(long)]
    delegated_tool: Option<PathBuf>,

    /// Zero-pad bodies that are one byte shorter than declared
    #[arg(long)]
    pad_short_payload: bool,

    /// Only convert these worlds, e.g. `74`, `World74` or `74,75`
    #[arg(long = "world", value_name = "WORLD")]
    worlds: Vec<String>,

    /// Worker threads, 0 for all cores
    #[arg(long)]
    workers: Option<usize>,

    /// List what would be converted without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON summary here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Result<ConvertOptions> {
        let mut options = match &self.config {
            Some(path) => ConvertOptions::load(path)?,
            None => ConvertOptions::default(),
        };

        if self.texture_dir.is_some() {
            options.texture_root = self.texture_dir.clone();
        }
        if self.no_embed {
            options.embed_textures = false;
        }
        if self.overwrite {
            options.overwrite = true;
        }
        if self.delegated_tool.is_some() {
            options.delegated_tool = self.delegated_tool.clone();
        }
        if self.pad_short_payload {
            options.short_payload = ShortPayloadPolicy::PadOneByte;
        }
        if !self.worlds.is_empty() {
            options.worlds = parse_world_filters(&self.worlds)?;
        }
        if let Some(workers) = self.workers {
            options.workers = workers;
        }
        Ok(options)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn single_file_output(input: &Path, output: &Path) -> PathBuf {
    let is_glb = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("glb"));
    if is_glb {
        return output.to_path_buf();
    }
    let stem = input.file_stem().unwrap_or_default();
    output.join(stem).with_extension("glb")
}

fn convert_single(input: &Path, output: &Path, options: &ConvertOptions, dry_run: bool) -> ConversionStats {
    let output_path = single_file_output(input, output);
    if dry_run {
        info!("[dry-run] would convert {} -> {}", input.display(), output_path.display());
        return ConversionStats {
            total_found: 1,
            ..Default::default()
        };
    }

    let delegate = delegate_for(options);
    let output_root = output_path.parent().unwrap_or(Path::new("."));
    convert_file(input, &output_path, output_root, options, delegate.as_ref())
}

fn run(cli: &Cli) -> Result<ConversionStats> {
    let options = cli.options()?;

    let stats = if cli.input.is_file() {
        convert_single(&cli.input, &cli.output, &options, cli.dry_run)
    } else if !cli.input.is_dir() {
        anyhow::bail!("Input not found: {}", cli.input.display());
    } else if cli.dry_run {
        let jobs = plan_tree(&cli.input, &cli.output, &options);
        for (source, output) in &jobs {
            info!("[dry-run] would convert {} -> {}", source.display(), output.display());
        }
        ConversionStats {
            total_found: jobs.len(),
            ..Default::default()
        }
    } else {
        convert_tree(&cli.input, &cli.output, &options)
            .with_context(|| format!("Failed to convert {}", cli.input.display()))?
    };

    if let Some(report) = &cli.report {
        if !cli.dry_run {
            write_report(report, &stats, &options)?;
        }
    }
    Ok(stats)
}

fn print_summary(stats: &ConversionStats) {
    eprintln!("Conversion summary:");
    eprintln!("  Found:       {}", stats.total_found);
    eprintln!("  Converted:   {}", stats.converted);
    eprintln!(
        "  Skipped:     {} (no geometry {}, non-model {}, existing {}, corrupt {})",
        stats.skipped(),
        stats.skipped_no_geometry,
        stats.skipped_non_model,
        stats.skipped_existing,
        stats.skipped_corrupt
    );
    eprintln!("  Failed:      {}", stats.failed);
    for failure in stats.failures.iter().take(20) {
        eprintln!("    [{}] {}: {}", failure.kind, failure.source, failure.error);
    }
    if stats.failures.len() > 20 {
        eprintln!("    ... and {} more", stats.failures.len() - 20);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(stats) => {
            print_summary(&stats);
            if stats.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
