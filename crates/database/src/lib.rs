//! Securities-lending availability pipeline core.
//!
//! A periodic, stage-sequential batch job over local files:
//! raw per-country snapshot files -> parser -> change-tracking merger
//! (consulting the per-source history store) -> dedup/compaction -> one
//! master dataset, with tar.gz archival of completed generations.
//!
//! Each stage reads the filesystem state left by the previous one and writes
//! a new state; committed outputs are only ever superseded by a whole new
//! file, never patched in place.
//!
//! Key modules:
//! - `parse`: pipe-delimited snapshot files -> typed records + extraction time.
//! - `merge`: change-column comparison and timestamp carry-forward.
//! - `store`: per-source Parquet history artifacts with atomic replacement.
//! - `compact` / `compile`: dedup within a source, then across all sources.
//! - `retention`: archival of completed generations.
//! - `paths` / `config`: generation directory layout and env-driven settings.

pub mod compact;
pub mod compile;
pub mod config;
pub mod ingest;
pub mod merge;
pub mod parquet;
pub mod parse;
pub mod paths;
pub mod retention;
pub mod store;
