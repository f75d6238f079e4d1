use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use sl_database::compact::resample_all;
use sl_database::compile::{MASTER_FILE_NAME, compile_master};
use sl_database::config::PipelineConfig;
use sl_database::ingest::process_latest_generation;
use sl_database::parquet::read_history;
use sl_database::paths::generation_dir_name;
use sl_database::retention::run_cleanup;
use sl_database::store::{FsHistoryStore, HistoryStore};
use sl_types::SourceId;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn ts(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 4, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

/// Lay down one raw generation directory containing the given files.
fn write_generation(data_dir: &Path, at: NaiveDateTime, files: &[(&str, &str)]) {
    let dir = data_dir.join(generation_dir_name(at));
    fs::create_dir_all(&dir).unwrap();
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

fn usa_file(bof: &str, aapl_fee: &str) -> String {
    format!(
        "#BOF|{bof}\n\
         #SYM|CUR|NAME|CON|ISIN|REBATERATE|FEERATE|AVAILABLE\n\
         AAPL|USD|APPLE INC|265598|US0378331005|-0.25|{aapl_fee}|1000000\n\
         TSLA|USD|TESLA INC|76792991|US88160R1014|-1.0|1.0|500000\n\
         #EOF\n"
    )
}

const CAN_FILE: &str = "\
#BOF|2025.04.14|10:00:00
#SYM|CUR|NAME|CON|ISIN|REBATERATE|FEERATE|AVAILABLE
SHOP|CAD|SHOPIFY INC|1111|CA82509L1076|-0.5|0.5|200000
AAPL|CAD|APPLE CDR|2222|CA03783Y1060|-0.3|0.3|50000
#EOF
";

#[test]
fn full_run_compiles_master_across_sources() -> Result<()> {
    let tmp = tempdir()?;
    let data_dir = tmp.path().join("data_upload");
    let cfg = PipelineConfig::with_data_dir(&data_dir);
    let store = FsHistoryStore::new(cfg.compiled_dir(), cfg.zstd_level);

    write_generation(
        &data_dir,
        ts(14, 9),
        &[
            ("usa.txt", &usa_file("2025.04.14|10:00:00", "0.25")),
            ("can.txt", CAN_FILE),
        ],
    );

    let summary = process_latest_generation(&cfg, &store)?;
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 0);

    let out_dir = resample_all(&cfg, ts(14, 12))?;
    assert!(out_dir.join("usa_processed.parquet").exists());
    assert!(out_dir.join("can_processed.parquet").exists());

    let master_path = compile_master(&cfg)?;
    assert_eq!(master_path, out_dir.join(MASTER_FILE_NAME));

    let master = read_history(&master_path)?;
    assert_eq!(master.len(), 4);

    // The same ticker from two countries stays two rows: COUNTRY is part of
    // the dedup key.
    let aapl_countries: Vec<&str> = master
        .iter()
        .filter(|r| r.record.symbol == "AAPL")
        .map(|r| r.record.country.as_str())
        .collect();
    assert_eq!(aapl_countries.len(), 2);
    assert!(aapl_countries.contains(&"USA"));
    assert!(aapl_countries.contains(&"CAN"));
    Ok(())
}

#[test]
fn recompiling_the_same_generation_is_idempotent() -> Result<()> {
    let tmp = tempdir()?;
    let data_dir = tmp.path().join("data_upload");
    let cfg = PipelineConfig::with_data_dir(&data_dir);
    let store = FsHistoryStore::new(cfg.compiled_dir(), cfg.zstd_level);

    write_generation(
        &data_dir,
        ts(14, 9),
        &[("usa.txt", &usa_file("2025.04.14|10:00:00", "0.25"))],
    );
    process_latest_generation(&cfg, &store)?;
    resample_all(&cfg, ts(14, 12))?;

    let first = read_history(&compile_master(&cfg)?)?;
    let second = read_history(&compile_master(&cfg)?)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn unchanged_snapshots_carry_timestamps_across_runs() -> Result<()> {
    let tmp = tempdir()?;
    let data_dir = tmp.path().join("data_upload");
    let cfg = PipelineConfig::with_data_dir(&data_dir);
    let store = FsHistoryStore::new(cfg.compiled_dir(), cfg.zstd_level);
    let usa = SourceId::from_file_stem("usa");

    write_generation(
        &data_dir,
        ts(14, 9),
        &[("usa.txt", &usa_file("2025.04.14|10:00:00", "0.25"))],
    );
    process_latest_generation(&cfg, &store)?;

    // Same values an hour later: timestamps must not advance.
    write_generation(
        &data_dir,
        ts(14, 10),
        &[("usa.txt", &usa_file("2025.04.14|11:00:00", "0.25"))],
    );
    process_latest_generation(&cfg, &store)?;

    let history = store.load(&usa)?;
    let aapl = history.iter().find(|r| r.record.symbol == "AAPL").unwrap();
    assert_eq!(aapl.timestamp, ts(14, 10));

    // Fee change at 12:00 advances the stamp.
    write_generation(
        &data_dir,
        ts(14, 11),
        &[("usa.txt", &usa_file("2025.04.14|12:00:00", "0.30"))],
    );
    process_latest_generation(&cfg, &store)?;

    let history = store.load(&usa)?;
    let aapl = history.iter().find(|r| r.record.symbol == "AAPL").unwrap();
    assert_eq!(aapl.timestamp, ts(14, 12));
    Ok(())
}

#[test]
fn missing_bof_falls_back_to_the_generation_capture_time() -> Result<()> {
    let tmp = tempdir()?;
    let data_dir = tmp.path().join("data_upload");
    let cfg = PipelineConfig::with_data_dir(&data_dir);
    let store = FsHistoryStore::new(cfg.compiled_dir(), cfg.zstd_level);

    let no_bof = "\
#SYM|CUR|NAME|CON|ISIN|REBATERATE|FEERATE|AVAILABLE
AAPL|USD|APPLE INC|265598|US0378331005|-0.25|0.25|1000000
";
    write_generation(&data_dir, ts(14, 9), &[("usa.txt", no_bof)]);
    process_latest_generation(&cfg, &store)?;

    let history = store.load(&SourceId::from_file_stem("usa"))?;
    assert_eq!(history[0].timestamp, ts(14, 9));
    Ok(())
}

#[test]
fn malformed_source_leaves_stored_history_byte_identical() -> Result<()> {
    let tmp = tempdir()?;
    let data_dir = tmp.path().join("data_upload");
    let cfg = PipelineConfig::with_data_dir(&data_dir);
    let store = FsHistoryStore::new(cfg.compiled_dir(), cfg.zstd_level);

    write_generation(
        &data_dir,
        ts(14, 9),
        &[("usa.txt", &usa_file("2025.04.14|10:00:00", "0.25"))],
    );
    process_latest_generation(&cfg, &store)?;

    let artifact = store.path_for(&SourceId::from_file_stem("usa"));
    let before = fs::read(&artifact)?;

    // A later generation whose file has no header is skipped outright.
    write_generation(
        &data_dir,
        ts(14, 10),
        &[("usa.txt", "AAPL|USD|0.9\nTSLA|USD|0.1\n")],
    );
    let summary = process_latest_generation(&cfg, &store)?;
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 1);

    let after = fs::read(&artifact)?;
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn cleanup_archives_completed_generations_and_keeps_newest_resampled() -> Result<()> {
    let tmp = tempdir()?;
    let data_dir = tmp.path().join("data_upload");
    let cfg = PipelineConfig::with_data_dir(&data_dir);
    let store = FsHistoryStore::new(cfg.compiled_dir(), cfg.zstd_level);

    write_generation(
        &data_dir,
        ts(14, 9),
        &[("usa.txt", &usa_file("2025.04.14|10:00:00", "0.25"))],
    );
    process_latest_generation(&cfg, &store)?;
    resample_all(&cfg, ts(14, 10))?;
    resample_all(&cfg, ts(14, 12))?;

    // An in-flight download staged under a non-generation name must survive.
    let staging = data_dir.join("2025-04-15_09-00-00.partial");
    fs::create_dir_all(&staging)?;
    fs::write(staging.join("usa.txt"), "partial")?;

    run_cleanup(&cfg)?;

    let raw_dir = data_dir.join(generation_dir_name(ts(14, 9)));
    assert!(!raw_dir.exists());
    assert!(data_dir
        .join(format!("{}.tar.gz", generation_dir_name(ts(14, 9))))
        .exists());
    assert!(staging.exists());

    let resampled = cfg.resampled_dir();
    assert!(!resampled.join(generation_dir_name(ts(14, 10))).exists());
    assert!(resampled
        .join(format!("{}.tar.gz", generation_dir_name(ts(14, 10))))
        .exists());
    assert!(resampled.join(generation_dir_name(ts(14, 12))).exists());
    Ok(())
}
