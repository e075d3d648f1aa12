use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::Local;
use serde::Deserialize;
use crate::config::ProcessorConfig;
use crate::error::{ConfigError, FailureKind, ProcessorFailure};
use crate::message::Message;
use super::{ProcessResult, Processor, ProcessorContext};

#[derive(Debug, Deserialize)]
struct ArchiveOptions {
    archive_dir: Option<PathBuf>,
    extension: Option<String>,
}

/// Stores a copy of every message under a timestamped name.
#[derive(Debug)]
pub struct ArchiveProcessor {
    name: String,
    archive_dir: PathBuf,
    extension: String,
    sequence: AtomicU64,
}

impl ArchiveProcessor {
    pub fn configure(config: &ProcessorConfig, _ctx: &ProcessorContext) -> Result<Self, ConfigError> {
        let options: ArchiveOptions = config.parse_options()?;

        let archive_dir = options.archive_dir.ok_or_else(|| ConfigError::MissingOption {
            name: config.name.clone(),
            key: "archive_dir".to_string(),
        })?;

        let extension = options
            .extension
            .map(|e| e.trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "eml".to_string());

        Ok(Self {
            name: config.name.clone(),
            archive_dir,
            extension,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    fn next_path(&self) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = Local::now().format("%Y%m%d-%H%M%S%.6f");
        self.archive_dir
            .join(format!("{}-{}.{}", stamp, seq, self.extension))
    }

    fn store(&self, message: &Message) -> Result<PathBuf, ProcessorFailure> {
        fs::create_dir_all(&self.archive_dir)
            .map_err(|e| ProcessorFailure::from_error(FailureKind::Io, &e))?;

        let path = self.next_path();
        fs::write(&path, message.to_wire())
            .map_err(|e| ProcessorFailure::from_error(FailureKind::Io, &e))?;
        Ok(path)
    }
}

impl Processor for ArchiveProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &'static str {
        "ArchiveProcessor"
    }

    fn output_dir(&self) -> Option<&Path> {
        Some(&self.archive_dir)
    }

    fn process(&self, message: &Message) -> ProcessResult {
        match self.store(message) {
            Ok(path) => {
                tracing::debug!("{}: archived to {}", self.name, path.display());
                ProcessResult::Delivered
            }
            Err(failure) => ProcessResult::Failed(failure),
        }
    }
}
