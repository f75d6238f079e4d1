use crate::source::SourceId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One row of a per-country borrow availability snapshot.
///
/// `symbol` is the business key within a country and is normalized
/// (uppercased, trimmed) on ingestion. The numeric fields are nullable:
/// a value the feed could not express as a number is an explicit `None`,
/// never a dropped row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub symbol: String,
    pub currency: Option<String>,
    pub name: Option<String>,
    /// Broker contract id (the feed's `CON` column).
    pub contract_id: Option<String>,
    pub isin: Option<String>,
    pub rebate_rate: Option<f64>,
    pub fee_rate: Option<f64>,
    /// Shares available to borrow.
    pub available: Option<f64>,
    pub country: String,
}

impl BorrowRecord {
    /// Null-aware equality over the monitored columns (fee rate, rebate
    /// rate, available shares). Two nulls compare equal; null vs non-null
    /// or differing non-null values are a change.
    pub fn same_loan_terms(&self, other: &BorrowRecord) -> bool {
        eq_nullable(self.fee_rate, other.fee_rate)
            && eq_nullable(self.rebate_rate, other.rebate_rate)
            && eq_nullable(self.available, other.available)
    }
}

#[inline]
fn eq_nullable(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// A borrow record plus the time at which its monitored columns last
/// differed from the immediately preceding known state for that symbol.
///
/// The timestamp advances only on genuine change (or first appearance),
/// so downstream consumers can read it as "as of when this state became
/// true", not "when we happened to observe it".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedRecord {
    pub record: BorrowRecord,
    pub timestamp: NaiveDateTime,
}

/// One point-in-time extraction of borrow records from a single source file.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub source: SourceId,
    pub records: Vec<BorrowRecord>,
    /// The file's declared begin-of-file time, when it carries one.
    pub extracted_at: Option<NaiveDateTime>,
}

/// Canonical symbol form used as the per-source business key.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}
