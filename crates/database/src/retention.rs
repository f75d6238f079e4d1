//! The delete step: pack completed generations into tar.gz archives and
//! remove the originals, bounding local disk growth.
//!
//! Only directories whose name parses as a generation timestamp are
//! touched, so an in-flight download staged under a different name is never
//! archived out from under the downloader.

use crate::config::PipelineConfig;
use crate::paths::generation_dirs;
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::path::{Path, PathBuf};

/// Pack `dir` into a sibling `<name>.tar.gz` and remove the original.
fn archive_and_remove(dir: &Path) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .context("generation directory has a non-UTF8 name")?;
    let archive_path = dir.with_extension("tar.gz");

    let file = fs::File::create(&archive_path)
        .with_context(|| format!("creating {}", archive_path.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);
    tar.append_dir_all(name, dir)?;
    tar.into_inner()?.finish()?;

    fs::remove_dir_all(dir)?;
    Ok(archive_path)
}

/// Archive every completed raw download generation.
pub fn archive_raw_generations(cfg: &PipelineConfig) -> Result<usize> {
    let mut archived = 0;
    for (_, dir) in generation_dirs(&cfg.data_dir)? {
        let path =
            archive_and_remove(&dir).with_context(|| format!("archiving {}", dir.display()))?;
        tracing::info!(archive = %path.display(), "archived raw generation");
        archived += 1;
    }
    Ok(archived)
}

/// Archive all but the newest resampled generation, which stays uncompressed
/// so an in-flight compile can still read it.
pub fn archive_stale_resampled(cfg: &PipelineConfig) -> Result<usize> {
    let mut generations = generation_dirs(&cfg.resampled_dir())?;
    let newest = generations.pop();

    let mut archived = 0;
    for (_, dir) in generations {
        let path =
            archive_and_remove(&dir).with_context(|| format!("archiving {}", dir.display()))?;
        tracing::info!(archive = %path.display(), "archived stale resampled generation");
        archived += 1;
    }
    if let Some((_, kept)) = newest {
        tracing::info!(kept = %kept.display(), "kept newest resampled generation");
    }
    Ok(archived)
}

/// The whole delete step.
pub fn run_cleanup(cfg: &PipelineConfig) -> Result<()> {
    let raw = archive_raw_generations(cfg)?;
    let resampled = archive_stale_resampled(cfg)?;
    tracing::info!(raw, resampled, "cleanup complete");
    Ok(())
}
