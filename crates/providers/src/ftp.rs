//! Thin FTP downloader for the publisher's per-country snapshot files.
//!
//! This is feed plumbing, not pipeline core: it only materializes raw
//! `*.txt` files into a fresh generation directory for the process step to
//! consume. Per-file failures are logged and counted, never fatal to the
//! batch; only the connection itself is.

use anyhow::{Context, Result};
use chrono::Local;
use sl_database::config::PipelineConfig;
use sl_database::paths::generation_dir_name;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use suppaftp::FtpStream;

pub const FTP_SERVER: &str = "ftp2.interactivebrokers.com:21";
pub const FTP_USERNAME: &str = "shortstock";
pub const FTP_PASSWORD: &str = "";

/// Download every `.txt` file the server lists into a new generation
/// directory. Files land in a `.partial` staging directory that is renamed
/// into place once complete, so a concurrent cleanup or process step never
/// sees a half-written generation.
pub fn download_snapshot(cfg: &PipelineConfig) -> Result<PathBuf> {
    fs::create_dir_all(&cfg.data_dir)?;
    let name = generation_dir_name(Local::now().naive_local());
    let staging = cfg.data_dir.join(format!("{name}.partial"));
    let final_dir = cfg.data_dir.join(&name);
    fs::create_dir_all(&staging)?;

    let mut ftp =
        FtpStream::connect(FTP_SERVER).with_context(|| format!("connecting to {FTP_SERVER}"))?;
    ftp.login(FTP_USERNAME, FTP_PASSWORD).context("ftp login")?;
    tracing::info!(server = FTP_SERVER, "connected");

    let listing = ftp.nlst(None).context("listing remote files")?;
    let txt_files: Vec<String> = listing
        .into_iter()
        .filter(|f| f.to_lowercase().ends_with(".txt"))
        .collect();
    tracing::info!(files = txt_files.len(), "remote snapshot files found");

    let mut downloaded = 0usize;
    let mut errors = 0usize;
    for remote in &txt_files {
        let file_name = remote.rsplit('/').next().unwrap_or(remote);
        match ftp.retr_as_buffer(remote) {
            Ok(buf) => {
                let local = staging.join(file_name);
                fs::File::create(&local)?.write_all(buf.get_ref())?;
                downloaded += 1;
                tracing::info!(file = file_name, "downloaded");
            }
            Err(err) => {
                errors += 1;
                tracing::error!(file = file_name, %err, "download failed");
            }
        }
    }
    let _ = ftp.quit();

    fs::rename(&staging, &final_dir)
        .with_context(|| format!("finalizing {}", final_dir.display()))?;
    tracing::info!(downloaded, errors, dir = %final_dir.display(), "download complete");
    Ok(final_dir)
}
