//! The process step: parse the newest raw generation and fold each source's
//! snapshot into its stored history with change-tracked timestamps.
//!
//! Per-file failures (unreadable or malformed sources) are logged and
//! skipped so one bad feed never aborts the batch; store and filesystem
//! failures are fatal to the step.

use crate::config::PipelineConfig;
use crate::merge::merge_with_change_tracking;
use crate::parse::{ParseOutcome, parse_snapshot};
use crate::paths::latest_generation_dir;
use crate::store::{HistoryStore, StoreError};
use anyhow::{Context, Result, anyhow};
use sl_types::SourceId;
use std::fs;
use std::path::PathBuf;

/// Per-run accounting, for logs and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    pub processed: usize,
    pub skipped: usize,
}

pub fn process_latest_generation(
    cfg: &PipelineConfig,
    store: &dyn HistoryStore,
) -> Result<ProcessSummary> {
    let (generation_ts, generation_dir) = latest_generation_dir(&cfg.data_dir)?
        .ok_or_else(|| anyhow!("no download generations found in {}", cfg.data_dir.display()))?;

    let mut files: Vec<PathBuf> = fs::read_dir(&generation_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(anyhow!("no .txt files in {}", generation_dir.display()));
    }

    tracing::info!(
        files = files.len(),
        generation = %generation_dir.display(),
        "processing snapshot generation"
    );

    let mut summary = ProcessSummary::default();
    for path in files {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let source = SourceId::from_file_stem(stem);

        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(err) => {
                tracing::error!(file = %path.display(), %err, "unreadable snapshot file, skipping");
                summary.skipped += 1;
                continue;
            }
        };

        let snapshot = match parse_snapshot(&text, source.clone()) {
            ParseOutcome::Parsed(s) => s,
            ParseOutcome::Skipped(reason) => {
                tracing::warn!(
                    file = %path.display(),
                    %reason,
                    "skipping malformed source; stored history untouched this run"
                );
                summary.skipped += 1;
                continue;
            }
        };

        // Prefer the file's own begin-of-file time; fall back to the
        // generation's capture time.
        let extracted_at = snapshot.extracted_at.unwrap_or(generation_ts);
        if snapshot.records.is_empty() {
            tracing::warn!(
                source = %source,
                "snapshot carries zero records: this source's merged history will be emptied this run"
            );
        }

        let previous = match store.load(&source) {
            Ok(rows) => rows,
            Err(StoreError::SchemaDrift(column)) => {
                tracing::warn!(
                    source = %source,
                    column,
                    "stored history is missing an expected column; treating the whole snapshot as new"
                );
                Vec::new()
            }
            Err(err) => {
                return Err(err).with_context(|| format!("loading history for {source}"));
            }
        };

        let merged = merge_with_change_tracking(&previous, snapshot.records, extracted_at);
        store
            .save(&source, &merged)
            .with_context(|| format!("saving history for {source}"))?;
        tracing::info!(source = %source, rows = merged.len(), "merged snapshot");
        summary.processed += 1;
    }

    tracing::info!(
        processed = summary.processed,
        skipped = summary.skipped,
        "process step complete"
    );
    Ok(summary)
}
