pub mod records;
pub mod source;

pub use records::{BorrowRecord, Snapshot, TrackedRecord, normalize_symbol};
pub use source::SourceId;
