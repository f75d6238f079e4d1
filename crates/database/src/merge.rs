use ahash::AHashMap;
use chrono::NaiveDateTime;
use sl_types::{BorrowRecord, TrackedRecord};

/// Fold a freshly parsed snapshot into the previous history for the same
/// source.
///
/// Every record in `incoming` appears in the output exactly once: unseen
/// symbols and symbols whose monitored columns changed are stamped with
/// `extracted_at`; unchanged symbols inherit the timestamp of their previous
/// record. Symbols missing from `incoming` are not carried over — the merge
/// reflects only what the new snapshot reported, so a gap in a feed drops a
/// symbol from history until it reappears.
pub fn merge_with_change_tracking(
    previous: &[TrackedRecord],
    incoming: Vec<BorrowRecord>,
    extracted_at: NaiveDateTime,
) -> Vec<TrackedRecord> {
    // Latest previous record per symbol wins when re-runs left duplicates.
    let mut last_known: AHashMap<&str, &TrackedRecord> = AHashMap::with_capacity(previous.len());
    for rec in previous {
        last_known.insert(rec.record.symbol.as_str(), rec);
    }

    incoming
        .into_iter()
        .map(|record| {
            let timestamp = match last_known.get(record.symbol.as_str()) {
                Some(prev) if prev.record.same_loan_terms(&record) => prev.timestamp,
                _ => extracted_at,
            };
            TrackedRecord { record, timestamp }
        })
        .collect()
}
