//! Dedup/compaction of tracked-record tables, and the resample step that
//! applies it to every per-source history.

use crate::config::PipelineConfig;
use crate::parquet::{read_history, write_history_atomic};
use crate::paths::generation_dir_name;
use ahash::AHashMap;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use sl_types::{BorrowRecord, TrackedRecord, normalize_symbol};
use std::fs;
use std::path::PathBuf;

/// Dedup key: every column except the timestamp. Floats key by bit pattern
/// so nulls and exact values compare the way the change tracker does.
#[derive(PartialEq, Eq, Hash)]
struct StateKey {
    symbol: String,
    currency: Option<String>,
    name: Option<String>,
    contract_id: Option<String>,
    isin: Option<String>,
    rebate_rate: Option<u64>,
    fee_rate: Option<u64>,
    available: Option<u64>,
    country: String,
}

impl StateKey {
    fn of(rec: &BorrowRecord) -> Self {
        Self {
            symbol: rec.symbol.clone(),
            currency: rec.currency.clone(),
            name: rec.name.clone(),
            contract_id: rec.contract_id.clone(),
            isin: rec.isin.clone(),
            rebate_rate: rec.rebate_rate.map(f64::to_bits),
            fee_rate: rec.fee_rate.map(f64::to_bits),
            available: rec.available.map(f64::to_bits),
            country: rec.country.clone(),
        }
    }
}

/// Collapse a history to one row per distinct attribute state, keeping the
/// occurrence with the latest timestamp (exact ties keep the later
/// occurrence in input order). Symbol normalization is re-applied and
/// empty-symbol rows dropped, since accumulated state may predate a format
/// change.
pub fn compact_history(rows: Vec<TrackedRecord>) -> Vec<TrackedRecord> {
    let mut kept: Vec<TrackedRecord> = Vec::with_capacity(rows.len());
    let mut index: AHashMap<StateKey, usize> = AHashMap::with_capacity(rows.len());

    for mut row in rows {
        row.record.symbol = normalize_symbol(&row.record.symbol);
        if row.record.symbol.is_empty() {
            continue;
        }
        let key = StateKey::of(&row.record);
        match index.get(&key) {
            Some(&slot) => {
                if row.timestamp >= kept[slot].timestamp {
                    kept[slot] = row;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(row);
            }
        }
    }
    kept
}

/// The resample step: compact every per-source history into a fresh
/// generation directory under `resampled/`.
pub fn resample_all(cfg: &PipelineConfig, run_ts: NaiveDateTime) -> Result<PathBuf> {
    let compiled = cfg.compiled_dir();
    let mut histories: Vec<PathBuf> = match fs::read_dir(&compiled) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_processed.parquet"))
            })
            .collect(),
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", compiled.display()));
        }
    };
    histories.sort();
    if histories.is_empty() {
        return Err(anyhow!("no processed histories in {}", compiled.display()));
    }

    let out_dir = cfg.resampled_dir().join(generation_dir_name(run_ts));
    fs::create_dir_all(&out_dir)?;
    tracing::info!(files = histories.len(), out = %out_dir.display(), "resampling processed histories");

    for path in histories {
        let Some(name) = path.file_name() else { continue };
        let rows = read_history(&path).with_context(|| format!("reading {}", path.display()))?;
        let before = rows.len();
        let rows = compact_history(rows);
        let target = out_dir.join(name);
        write_history_atomic(&target, &rows, cfg.zstd_level)
            .with_context(|| format!("writing {}", target.display()))?;
        tracing::info!(
            file = %target.display(),
            rows = rows.len(),
            dropped = before - rows.len(),
            "resampled"
        );
    }
    Ok(out_dir)
}
