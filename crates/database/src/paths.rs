//! Generation directory naming and discovery. A "generation" is one
//! timestamped download or resample run; the name is the capture time.

use chrono::NaiveDateTime;
use sl_types::SourceId;
use std::fs;
use std::path::{Path, PathBuf};

pub const GENERATION_TS_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub fn generation_dir_name(ts: NaiveDateTime) -> String {
    ts.format(GENERATION_TS_FORMAT).to_string()
}

/// Parse a directory name back into its generation timestamp. Names that do
/// not match the format exactly (staging dirs, archives) yield `None`.
pub fn parse_generation_name(name: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(name, GENERATION_TS_FORMAT).ok()
}

/// All completed generation directories under `parent`, sorted ascending.
pub fn generation_dirs(parent: &Path) -> std::io::Result<Vec<(NaiveDateTime, PathBuf)>> {
    let mut out = Vec::new();
    if !parent.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(ts) = parse_generation_name(name) {
            out.push((ts, entry.path()));
        }
    }
    out.sort_by_key(|(ts, _)| *ts);
    Ok(out)
}

pub fn latest_generation_dir(parent: &Path) -> std::io::Result<Option<(NaiveDateTime, PathBuf)>> {
    let mut dirs = generation_dirs(parent)?;
    Ok(dirs.pop())
}

/// Deterministic per-source history artifact name, e.g. `usa_processed.parquet`.
pub fn history_file_name(source: &SourceId) -> String {
    format!("{}_processed.parquet", source.as_str().to_lowercase())
}
