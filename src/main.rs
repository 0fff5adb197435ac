use crate::inspect::inspect_file;
use chartscan::ScanError as LibScanError;
use clap::{Parser, Subcommand};
use config::Config;
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

mod config;
mod inspect;

fn main() {
    let result = main_result();
    std::process::exit(match result {
        Ok(()) => 0,
        Err(err) => {
            // use Display instead of Debug for user friendly error messages
            log::error!("{err}");
            1
        }
    });
}

pub fn main_result() -> Result<(), AppError> {
    // setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("chartscan=info"))
        .init();

    let args = CliArgs::parse();
    match args.command {
        Command::Inspect { path } => inspect(&path),
        Command::Scan { folders } => {
            let mut local_config = Config::read_config()?;
            if !folders.is_empty() {
                for folder in &folders {
                    if !folder.is_dir() {
                        return Err(AppError::ConfigError(format!(
                            "Song folder not found {folder:?}"
                        )));
                    }
                }
                local_config.set_song_folders(folders)?;
            }
            if local_config.song_folders().is_empty() {
                return Err(AppError::ConfigError(
                    "No song folder given and none configured".to_string(),
                ));
            }
            scan(local_config.song_folders());
            Ok(())
        }
    }
}

fn inspect(path: &Path) -> Result<(), AppError> {
    if !path.exists() {
        return Err(AppError::ConfigError(format!("File not found {path:?}")));
    }
    match inspect_file(path)? {
        Some(report) => {
            println!("{}", report.title);
            for line in report.lines {
                println!("  {line}");
            }
        }
        None => log::warn!("{} is not a recognised chart file", path.display()),
    }
    Ok(())
}

/// Inspects every file below `folders` in parallel. Failures are logged and counted.
fn scan(folders: &[PathBuf]) {
    let files: Vec<PathBuf> = folders
        .iter()
        .flat_map(|folder| {
            WalkDir::new(folder)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();
    log::info!("Scanning {} files in {} folders", files.len(), folders.len());

    let outcomes: Vec<ScanOutcome> = files
        .par_iter()
        .map(|path| match inspect_file(path) {
            Ok(Some(report)) => {
                log::info!("{}", report.title);
                ScanOutcome::Recognised
            }
            Ok(None) => ScanOutcome::Skipped,
            Err(err) => {
                log::warn!("{}: {err}", path.display());
                ScanOutcome::Failed
            }
        })
        .collect();

    let count = |outcome: ScanOutcome| outcomes.iter().filter(|o| **o == outcome).count();
    log::info!(
        "Scan done: {} recognised, {} failed",
        count(ScanOutcome::Recognised),
        count(ScanOutcome::Failed)
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanOutcome {
    Recognised,
    Skipped,
    Failed,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the content of a package, MIDI, .chart, song.ini or songs.dta file.
    Inspect {
        /// Path to the file.
        path: PathBuf,
    },
    /// Inspect every file below the song folders.
    Scan {
        /// Song folders, replacing the configured ones when given.
        folders: Vec<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("parsing error: {0}")]
    ParsingError(String),
    #[error("other error: {0}")]
    OtherError(String),
}

impl From<LibScanError> for AppError {
    fn from(error: LibScanError) -> Self {
        match error {
            LibScanError::ParsingError(s) => Self::ParsingError(s),
            LibScanError::ConfigError(s) => Self::ConfigError(s),
            err @ LibScanError::ArchiveError { .. } => Self::OtherError(err.to_string()),
            LibScanError::IoError(s) => Self::OtherError(s),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::OtherError(error.to_string())
    }
}
