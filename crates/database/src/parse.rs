//! Pipe-delimited snapshot file parser.
//!
//! One raw feed file carries optional `#BOF|YYYY.MM.DD|HH:MM:SS` / `#EOF`
//! marker lines, a comment-prefixed header whose first token is the symbol
//! sentinel (`#SYM|...`), free-form comment lines, and `|`-delimited data
//! rows. Real-world feeds are not strictly rectangular: short rows are
//! padded with nulls and long rows truncated rather than failing the run.

use chrono::NaiveDateTime;
use sl_types::{BorrowRecord, Snapshot, SourceId, normalize_symbol};
use strum_macros::Display;

pub const FIELD_DELIMITER: char = '|';

/// Outcome of parsing one raw source file. A skip is not an error: the
/// caller decides whether the batch continues.
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(Snapshot),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    /// No `#SYM|...` header line anywhere in the file. We refuse to guess a
    /// schema.
    MissingHeader,
    /// A header was found but carries no symbol column.
    MissingSymbolColumn,
}

pub fn parse_snapshot(text: &str, source: SourceId) -> ParseOutcome {
    let mut header: Option<Vec<String>> = None;
    let mut extracted_at: Option<NaiveDateTime> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("#BOF") {
            extracted_at = parse_bof_timestamp(line);
            continue;
        }
        if line.starts_with("#EOF") {
            continue;
        }
        let upper = line.to_uppercase();
        if upper.starts_with("#SYM|") || upper.starts_with("#SYM\t") {
            header = Some(
                line[1..]
                    .split(FIELD_DELIMITER)
                    .map(|c| c.trim().to_uppercase())
                    .filter(|c| !c.is_empty())
                    .collect(),
            );
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        data_lines.push(line);
    }

    let Some(columns) = header else {
        return ParseOutcome::Skipped(SkipReason::MissingHeader);
    };
    let Some(layout) = ColumnLayout::from_header(&columns) else {
        return ParseOutcome::Skipped(SkipReason::MissingSymbolColumn);
    };

    let country = source.as_str().to_string();
    let mut records = Vec::with_capacity(data_lines.len());
    for line in data_lines {
        let mut fields: Vec<&str> = line.split(FIELD_DELIMITER).map(str::trim).collect();
        fields.resize(columns.len(), "");
        if let Some(record) = layout.record_from(&fields, &country) {
            records.push(record);
        }
    }

    ParseOutcome::Parsed(Snapshot {
        source,
        records,
        extracted_at,
    })
}

/// Column positions resolved once per file; data rows never re-validate.
/// Aliases cover header spellings the feed has used over time.
struct ColumnLayout {
    symbol: usize,
    currency: Option<usize>,
    name: Option<usize>,
    contract_id: Option<usize>,
    isin: Option<usize>,
    rebate_rate: Option<usize>,
    fee_rate: Option<usize>,
    available: Option<usize>,
}

impl ColumnLayout {
    fn from_header(columns: &[String]) -> Option<Self> {
        let find =
            |names: &[&str]| columns.iter().position(|c| names.contains(&c.as_str()));
        Some(Self {
            symbol: find(&["SYM", "SYMBOL"])?,
            currency: find(&["CUR", "CURRENCY"]),
            name: find(&["NAME"]),
            contract_id: find(&["CON", "IB_CONTRACT_ID"]),
            isin: find(&["ISIN"]),
            rebate_rate: find(&["REBATERATE", "REBATE_RATE"]),
            fee_rate: find(&["FEERATE", "FEE_RATE"]),
            available: find(&["AVAILABLE", "AVAILABLE_SHARES"]),
        })
    }

    fn record_from(&self, fields: &[&str], country: &str) -> Option<BorrowRecord> {
        let symbol = normalize_symbol(fields[self.symbol]);
        if symbol.is_empty() {
            // malformed/placeholder line
            return None;
        }
        Some(BorrowRecord {
            symbol,
            currency: self.currency.and_then(|i| text_value(fields[i])),
            name: self.name.and_then(|i| text_value(fields[i])),
            contract_id: self.contract_id.and_then(|i| text_value(fields[i])),
            isin: self.isin.and_then(|i| text_value(fields[i])),
            rebate_rate: self.rebate_rate.and_then(|i| numeric_value(fields[i])),
            fee_rate: self.fee_rate.and_then(|i| numeric_value(fields[i])),
            available: self.available.and_then(|i| numeric_value(fields[i])),
            country: country.to_string(),
        })
    }
}

/// Placeholder `NA` and empty fields are nulls.
fn text_value(field: &str) -> Option<String> {
    match field {
        "" | "NA" => None,
        v => Some(v.to_string()),
    }
}

/// Failure-to-null coercion: the feed mixes placeholders and occasional junk
/// into numeric columns, and a bad cell must not drop the row.
fn numeric_value(field: &str) -> Option<f64> {
    match field {
        "" | "NA" => None,
        v => v.parse().ok(),
    }
}

/// `#BOF|2025.04.14|19:06:47` -> the file's declared extraction time.
fn parse_bof_timestamp(line: &str) -> Option<NaiveDateTime> {
    let mut parts = line.split(FIELD_DELIMITER);
    let _marker = parts.next();
    let (date, time) = (parts.next()?, parts.next()?);
    let joined = format!("{} {}", date.trim(), time.trim());
    match NaiveDateTime::parse_from_str(&joined, "%Y.%m.%d %H:%M:%S") {
        Ok(ts) => Some(ts),
        Err(err) => {
            tracing::warn!(line, %err, "unparseable begin-of-file timestamp");
            None
        }
    }
}
