use std::path::PathBuf;

/// Directory and compression settings for a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Root under which raw generations, per-source processed state and
    /// resampled output live.
    pub data_dir: PathBuf,
    pub zstd_level: i32,
}

impl PipelineConfig {
    /// Load settings from the environment, reading `.env` best-effort first.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let data_dir = std::env::var("SL_DATA_DIR").unwrap_or_else(|_| "data_upload".to_string());
        let zstd_level = std::env::var("SL_ZSTD_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(6);
        Self {
            data_dir: PathBuf::from(data_dir),
            zstd_level,
        }
    }

    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            zstd_level: 6,
        }
    }

    /// Per-source processed histories live here between runs.
    pub fn compiled_dir(&self) -> PathBuf {
        self.data_dir.join("compiled")
    }

    /// Deduplicated per-source tables, one generation directory per resample run.
    pub fn resampled_dir(&self) -> PathBuf {
        self.data_dir.join("resampled")
    }
}
