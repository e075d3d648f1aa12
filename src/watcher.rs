use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use crate::error::WatchSetupError;
use crate::events::{EventPoll, EventSource, RawEvent};
use crate::watchset::WatchSet;

/// Event source backed by the platform's native file system notifications.
pub struct NotifyEventSource {
    _watcher: RecommendedWatcher,
    event_rx: Receiver<notify::Result<Event>>,
    pending: VecDeque<RawEvent>,
}

impl NotifyEventSource {
    /// Validate and register every target in the set. Any failure aborts
    /// registration as a whole.
    pub fn register(watch_set: &WatchSet) -> Result<Self, WatchSetupError> {
        watch_set.validate()?;

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();

        // Create the notify watcher
        let mut watcher = notify::recommended_watcher(tx).map_err(WatchSetupError::Init)?;

        for target in watch_set.targets() {
            let mode = if target.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher
                .watch(&target.path, mode)
                .map_err(|source| WatchSetupError::Watch {
                    path: target.path.clone(),
                    source,
                })?;
            tracing::info!("Watching {} (recursive: {})", target.path.display(), target.recursive);
        }

        Ok(Self {
            _watcher: watcher,
            event_rx: rx,
            pending: VecDeque::new(),
        })
    }
}

impl EventSource for NotifyEventSource {
    fn next_event(&mut self, timeout: Duration) -> EventPoll {
        if let Some(event) = self.pending.pop_front() {
            return EventPoll::Event(event);
        }

        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                self.pending.extend(RawEvent::from_notify(event));
                match self.pending.pop_front() {
                    Some(event) => EventPoll::Event(event),
                    None => EventPoll::Timeout,
                }
            }
            Ok(Err(err)) => {
                tracing::error!("File watcher error: {}", err);
                EventPoll::Timeout
            }
            Err(RecvTimeoutError::Timeout) => EventPoll::Timeout,
            Err(RecvTimeoutError::Disconnected) => EventPoll::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RawEventKind;
    use crate::watchset::WatchTarget;
    use std::time::Instant;
    use tempfile::TempDir;

    fn watch_set_for(path: &std::path::Path) -> WatchSet {
        let mut cfg = crate::config::AppConfig::with_default_notifier();
        cfg.watch.directories = vec![path.to_path_buf()];
        WatchSet::from_config(&cfg).expect("Failed to derive watch set")
    }

    #[test]
    fn test_register_rejects_missing_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let set = watch_set_for(&temp_dir.path().join("missing"));

        assert!(matches!(
            NotifyEventSource::register(&set),
            Err(WatchSetupError::NotFound(_))
        ));
    }

    #[test]
    fn test_file_write_produces_event() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let set = watch_set_for(temp_dir.path());
        assert_eq!(set.targets(), &[WatchTarget::new(temp_dir.path(), true)]);

        let mut source = NotifyEventSource::register(&set).expect("Failed to register watcher");

        let test_file = temp_dir.path().join("msg1");
        std::fs::write(&test_file, "Subject: Hello\n\nbody").expect("Failed to write test file");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = false;
        while Instant::now() < deadline {
            if let EventPoll::Event(event) = source.next_event(Duration::from_millis(200)) {
                let same = event.path.canonicalize().ok() == test_file.canonicalize().ok();
                if same && event.kind != RawEventKind::Other {
                    seen = true;
                    break;
                }
            }
        }

        assert!(seen, "Should have received a create/modify event for the file");
    }
}
