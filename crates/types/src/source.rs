use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identity of one availability feed, derived from the raw file stem
/// (country code, e.g. `usa.txt` -> `USA`). Tracked independently of all
/// other sources.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn from_file_stem(stem: &str) -> Self {
        Self(stem.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
