//! Directory watch set
//!
//! Derived once from configuration: the directory of every enabled
//! processor plus the static directories that feed the whole pipeline.
//! Never mutated after the watcher goes active.

use std::path::{Path, PathBuf};
use crate::config::AppConfig;
use crate::error::{ConfigError, WatchSetupError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub recursive: bool,
}

impl WatchTarget {
    pub fn new<P: Into<PathBuf>>(path: P, recursive: bool) -> Self {
        Self {
            path: path.into(),
            recursive,
        }
    }

    /// Check that the target exists, is a directory and can be listed.
    pub fn validate(&self) -> Result<(), WatchSetupError> {
        if !self.path.exists() {
            return Err(WatchSetupError::NotFound(self.path.clone()));
        }
        if !self.path.is_dir() {
            return Err(WatchSetupError::NotADirectory(self.path.clone()));
        }
        std::fs::read_dir(&self.path).map_err(|source| WatchSetupError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    targets: Vec<WatchTarget>,
}

impl WatchSet {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let mut set = WatchSet::default();
        let default_recursive = config.watch.recursive;

        for processor in config.enabled_processors() {
            if let Some(directory) = &processor.directory {
                tracing::info!("Add: {}({})", processor.name, directory.display());
                set.insert(WatchTarget::new(
                    directory.clone(),
                    processor.recursive.unwrap_or(default_recursive),
                ));
            }
        }

        if !config.watch.directories.is_empty() {
            if config.enabled_processors().next().is_none() {
                return Err(ConfigError::NoEnabledProcessors);
            }
            for directory in &config.watch.directories {
                tracing::info!("Add: --dir({})", directory.display());
                set.insert(WatchTarget::new(directory.clone(), default_recursive));
            }
        }

        if set.is_empty() {
            return Err(ConfigError::NoDirectories);
        }

        Ok(set)
    }

    fn insert(&mut self, target: WatchTarget) {
        match self.targets.iter_mut().find(|t| t.path == target.path) {
            Some(existing) => existing.recursive |= target.recursive,
            None => self.targets.push(target),
        }
    }

    /// Validate every target; the first failure aborts the whole set.
    pub fn validate(&self) -> Result<(), WatchSetupError> {
        self.targets.iter().try_for_each(WatchTarget::validate)
    }

    /// The target whose events would include files created at `path`.
    /// Paths are compared after resolving symlinks and relative parts.
    pub fn covering_target(&self, path: &Path) -> Option<&WatchTarget> {
        let path = resolve(path);
        self.targets.iter().find(|target| {
            let root = resolve(&target.path);
            path == root || (target.recursive && path.starts_with(&root))
        })
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.targets.iter().map(|t| t.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Canonicalize the longest existing prefix of `path` and re-attach the
/// components that do not exist yet.
fn resolve(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return absolute.clone(),
        }
    }
}
