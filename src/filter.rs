use std::path::Path;
use crate::config::WatchSettings;

/// Decides whether a path names a candidate message file.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    ignore_suffixes: Vec<String>,
}

impl MessageFilter {
    pub fn new<I, S>(ignore_suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore_suffixes: ignore_suffixes
                .into_iter()
                .map(|s| s.into().to_lowercase())
                .collect(),
        }
    }

    pub fn from_settings(settings: &WatchSettings) -> Self {
        Self::new(settings.ignore_suffixes.iter().cloned())
    }

    /// Name-based check only; does not touch the filesystem.
    pub fn is_candidate_name<P: AsRef<Path>>(&self, path: P) -> bool {
        let Some(name) = path.as_ref().file_name().and_then(|s| s.to_str()) else {
            return false;
        };

        // Hidden files and editor backups are transient
        if name.starts_with('.') || name.ends_with('~') {
            return false;
        }

        let lower = name.to_lowercase();
        !self
            .ignore_suffixes
            .iter()
            .any(|suffix| lower.ends_with(suffix.as_str()))
    }

    /// True when the path is a candidate name and currently a regular file.
    pub fn should_process<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        self.is_candidate_name(path) && path.is_file()
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::from_settings(&WatchSettings::default())
    }
}
