use anyhow::Result;
use sl_database::compact::resample_all;
use sl_database::compile::compile_master;
use sl_database::config::PipelineConfig;
use sl_database::ingest::process_latest_generation;
use sl_database::retention::run_cleanup;
use sl_database::store::FsHistoryStore;
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
enum Action {
    Download,
    Process,
    Resample,
    Compile,
    Delete,
}

fn usage() -> ! {
    eprintln!("usage: sl-pipeline <download|process|resample|compile|delete>");
    std::process::exit(1);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Some(arg) = std::env::args().nth(1) else {
        usage();
    };
    let Ok(action) = Action::from_str(&arg) else {
        eprintln!("unknown action '{arg}'");
        usage();
    };

    let cfg = PipelineConfig::from_env();
    tracing::info!(%action, data_dir = %cfg.data_dir.display(), "pipeline action");

    match action {
        Action::Download => {
            sl_providers::ftp::download_snapshot(&cfg)?;
        }
        Action::Process => {
            let store = FsHistoryStore::new(cfg.compiled_dir(), cfg.zstd_level);
            process_latest_generation(&cfg, &store)?;
        }
        Action::Resample => {
            resample_all(&cfg, chrono::Local::now().naive_local())?;
        }
        Action::Compile => {
            compile_master(&cfg)?;
        }
        Action::Delete => {
            run_cleanup(&cfg)?;
        }
    }
    Ok(())
}
