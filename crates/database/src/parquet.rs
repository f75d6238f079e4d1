//! Parquet writers and readers for tracked-record tables.
//!
//! One fixed, schema-tagged column set is used for every durable artifact
//! (per-source histories, resampled tables, the master dataset), so the
//! export layer never has to re-infer types.

use arrow::array::*;
use arrow::datatypes::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use sl_types::{BorrowRecord, TrackedRecord};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryFileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("parquet: {0}")]
    Pq(#[from] parquet::errors::ParquetError),
    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("schema drift: missing column {0}")]
    SchemaDrift(&'static str),
    #[error("column {0} has an unexpected type")]
    ColumnType(&'static str),
    #[error("invalid timestamp value {0}")]
    BadTimestamp(i64),
}

fn zstd_props(level: i32) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(
            ZstdLevel::try_new(level).unwrap_or(ZstdLevel::default()),
        ))
        .set_dictionary_enabled(true)
        .set_data_page_size_limit(128 * 1024)
        .set_write_batch_size(32 * 1024)
        .build()
}

/// The declared column set of every durable table this crate writes.
/// `TIMESTAMP` is timezone-naive by contract.
pub fn dataset_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("SYM", DataType::Utf8, false),
        Field::new("CURRENCY", DataType::Utf8, true),
        Field::new("NAME", DataType::Utf8, true),
        Field::new("CON", DataType::Utf8, true),
        Field::new("ISIN", DataType::Utf8, true),
        Field::new("REBATERATE", DataType::Float64, true),
        Field::new("FEERATE", DataType::Float64, true),
        Field::new("AVAILABLE", DataType::Float64, true),
        Field::new("COUNTRY", DataType::Utf8, false),
        Field::new(
            "TIMESTAMP",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
    ]))
}

fn append_opt_str(builder: &mut StringBuilder, value: &Option<String>) {
    match value {
        Some(v) => builder.append_value(v),
        None => builder.append_null(),
    }
}

fn append_opt_f64(builder: &mut Float64Builder, value: Option<f64>) {
    match value {
        Some(v) => builder.append_value(v),
        None => builder.append_null(),
    }
}

fn to_batch(rows: &[TrackedRecord]) -> Result<RecordBatch, HistoryFileError> {
    let schema = dataset_schema();
    let mut sym = StringBuilder::new();
    let mut currency = StringBuilder::new();
    let mut name = StringBuilder::new();
    let mut con = StringBuilder::new();
    let mut isin = StringBuilder::new();
    let mut rebate = Float64Builder::new();
    let mut fee = Float64Builder::new();
    let mut available = Float64Builder::new();
    let mut country = StringBuilder::new();
    let mut ts = TimestampMicrosecondBuilder::new();

    for r in rows {
        sym.append_value(&r.record.symbol);
        append_opt_str(&mut currency, &r.record.currency);
        append_opt_str(&mut name, &r.record.name);
        append_opt_str(&mut con, &r.record.contract_id);
        append_opt_str(&mut isin, &r.record.isin);
        append_opt_f64(&mut rebate, r.record.rebate_rate);
        append_opt_f64(&mut fee, r.record.fee_rate);
        append_opt_f64(&mut available, r.record.available);
        country.append_value(&r.record.country);
        ts.append_value(r.timestamp.and_utc().timestamp_micros());
    }

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(sym.finish()),
            Arc::new(currency.finish()),
            Arc::new(name.finish()),
            Arc::new(con.finish()),
            Arc::new(isin.finish()),
            Arc::new(rebate.finish()),
            Arc::new(fee.finish()),
            Arc::new(available.finish()),
            Arc::new(country.finish()),
            Arc::new(ts.finish()),
        ],
    )?)
}

/// Write a tracked-record table as ZSTD Parquet. A zero-row table still
/// produces a valid file carrying the full schema.
pub fn write_history_zstd(
    path: &Path,
    rows: &[TrackedRecord],
    zstd_level: i32,
) -> Result<(), HistoryFileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, dataset_schema(), Some(zstd_props(zstd_level)))?;
    let batch = to_batch(rows)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Write via a temp file in the destination directory, renamed into place,
/// so readers never observe a partial file and a crash mid-write cannot
/// corrupt the previous artifact.
pub fn write_history_atomic(
    target: &Path,
    rows: &[TrackedRecord],
    zstd_level: i32,
) -> Result<(), HistoryFileError> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = NamedTempFile::new_in(parent)?;
    write_history_zstd(tmp.path(), rows, zstd_level)?;
    tmp.persist(target).map_err(|e| HistoryFileError::Io(e.error))?;
    Ok(())
}

fn required(schema: &Schema, column: &'static str) -> Result<usize, HistoryFileError> {
    schema
        .index_of(column)
        .map_err(|_| HistoryFileError::SchemaDrift(column))
}

fn str_col<'a>(
    batch: &'a RecordBatch,
    idx: usize,
    column: &'static str,
) -> Result<&'a StringArray, HistoryFileError> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or(HistoryFileError::ColumnType(column))
}

fn f64_col<'a>(
    batch: &'a RecordBatch,
    idx: usize,
    column: &'static str,
) -> Result<&'a Float64Array, HistoryFileError> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or(HistoryFileError::ColumnType(column))
}

fn opt_string(col: Option<&StringArray>, i: usize) -> Option<String> {
    col.and_then(|c| (!c.is_null(i)).then(|| c.value(i).to_string()))
}

fn opt_f64(col: &Float64Array, i: usize) -> Option<f64> {
    (!col.is_null(i)).then(|| col.value(i))
}

/// Read a tracked-record table back.
///
/// The symbol, change and timestamp columns are load-bearing: an artifact
/// missing any of them (written before a format change) is reported as
/// schema drift rather than guessed at. The remaining columns are optional
/// and read as null when absent.
pub fn read_history(path: &Path) -> Result<Vec<TrackedRecord>, HistoryFileError> {
    let file = fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();

    let sym_idx = required(&schema, "SYM")?;
    let rebate_idx = required(&schema, "REBATERATE")?;
    let fee_idx = required(&schema, "FEERATE")?;
    let avail_idx = required(&schema, "AVAILABLE")?;
    let ts_idx = required(&schema, "TIMESTAMP")?;
    let currency_idx = schema.index_of("CURRENCY").ok();
    let name_idx = schema.index_of("NAME").ok();
    let con_idx = schema.index_of("CON").ok();
    let isin_idx = schema.index_of("ISIN").ok();
    let country_idx = schema.index_of("COUNTRY").ok();

    let reader = builder.build()?;
    let mut out = Vec::new();
    for batch in reader {
        let batch = batch?;
        let sym = str_col(&batch, sym_idx, "SYM")?;
        let rebate = f64_col(&batch, rebate_idx, "REBATERATE")?;
        let fee = f64_col(&batch, fee_idx, "FEERATE")?;
        let available = f64_col(&batch, avail_idx, "AVAILABLE")?;
        let ts = batch
            .column(ts_idx)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or(HistoryFileError::ColumnType("TIMESTAMP"))?;
        let currency = currency_idx.map(|i| str_col(&batch, i, "CURRENCY")).transpose()?;
        let name = name_idx.map(|i| str_col(&batch, i, "NAME")).transpose()?;
        let con = con_idx.map(|i| str_col(&batch, i, "CON")).transpose()?;
        let isin = isin_idx.map(|i| str_col(&batch, i, "ISIN")).transpose()?;
        let country = country_idx.map(|i| str_col(&batch, i, "COUNTRY")).transpose()?;

        for i in 0..batch.num_rows() {
            let micros = ts.value(i);
            let timestamp = chrono::DateTime::from_timestamp_micros(micros)
                .ok_or(HistoryFileError::BadTimestamp(micros))?
                .naive_utc();
            out.push(TrackedRecord {
                record: BorrowRecord {
                    symbol: sym.value(i).to_string(),
                    currency: opt_string(currency, i),
                    name: opt_string(name, i),
                    contract_id: opt_string(con, i),
                    isin: opt_string(isin, i),
                    rebate_rate: opt_f64(rebate, i),
                    fee_rate: opt_f64(fee, i),
                    available: opt_f64(available, i),
                    country: opt_string(country, i).unwrap_or_default(),
                },
                timestamp,
            });
        }
    }
    Ok(out)
}
