//! The compile step: merge every resampled per-source table into one master
//! dataset, re-applying the dedup rule across the union.

use crate::compact::compact_history;
use crate::config::PipelineConfig;
use crate::parquet::{read_history, write_history_atomic};
use crate::paths::latest_generation_dir;
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::PathBuf;

pub const MASTER_FILE_NAME: &str = "master.parquet";

/// Rebuild the master dataset from the newest resampled generation. The
/// master is a derived, disposable artifact: compiling twice from the same
/// inputs yields the same rows.
pub fn compile_master(cfg: &PipelineConfig) -> Result<PathBuf> {
    let resampled = cfg.resampled_dir();
    let (_, latest) = latest_generation_dir(&resampled)?
        .ok_or_else(|| anyhow!("no resampled generations in {}", resampled.display()))?;

    let mut inputs: Vec<PathBuf> = fs::read_dir(&latest)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".parquet") && n != MASTER_FILE_NAME)
        })
        .collect();
    // Concatenation order is the file-name order; the dedup tie-break
    // depends on it, so keep it pinned.
    inputs.sort();
    if inputs.is_empty() {
        return Err(anyhow!("no resampled tables in {}", latest.display()));
    }

    tracing::info!(files = inputs.len(), generation = %latest.display(), "compiling master dataset");

    let mut rows = Vec::new();
    for path in &inputs {
        let table = read_history(path).with_context(|| format!("reading {}", path.display()))?;
        tracing::info!(file = %path.display(), rows = table.len(), "loaded");
        rows.extend(table);
    }

    let master = compact_history(rows);
    let target = latest.join(MASTER_FILE_NAME);
    write_history_atomic(&target, &master, cfg.zstd_level)
        .with_context(|| format!("writing {}", target.display()))?;
    tracing::info!(rows = master.len(), out = %target.display(), "master compiled");
    Ok(target)
}
