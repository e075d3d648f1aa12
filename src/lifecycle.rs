//! Starting and stopping the watcher
//!
//! `start` performs every fallible step up front (watch set derivation,
//! processor configuration, output directory checks, directory
//! registration) and only then spawns
//! the event loop on its own thread. A failure at any step means no loop
//! is ever started.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crate::config::AppConfig;
use crate::error::{ConfigError, StartupError};
use crate::event_loop::{EventLoop, LoopStats, ShutdownSignal};
use crate::events::EventSource;
use crate::filter::MessageFilter;
use crate::processors::{ProcessorContext, ProcessorRegistry};
use crate::watcher::NotifyEventSource;
use crate::watchset::WatchSet;

/// Handle to an event loop running on its own thread.
pub struct RunningWatcher {
    watch_set: WatchSet,
    shutdown: ShutdownSignal,
    handle: JoinHandle<LoopStats>,
}

impl RunningWatcher {
    pub fn watch_set(&self) -> &WatchSet {
        &self.watch_set
    }

    /// Signal that can stop the loop from another thread (e.g. a ctrl-c handler).
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Block until the loop exits on its own or via the shutdown signal.
    pub fn wait(self) -> LoopStats {
        self.handle.join().unwrap_or_else(|_| {
            tracing::error!("Event loop thread panicked");
            LoopStats::default()
        })
    }

    /// Stop accepting events; an event already taken finishes dispatch.
    pub fn stop(self) -> LoopStats {
        self.shutdown.trigger();
        self.wait()
    }
}

/// Validate configuration, register every directory with the native
/// watcher and start the loop.
pub fn start(
    config: &AppConfig,
    registry: &ProcessorRegistry,
    ctx: &ProcessorContext,
) -> Result<RunningWatcher, StartupError> {
    start_with(config, registry, ctx, NotifyEventSource::register)
}

/// Like `start`, but with a caller-supplied event source built from the
/// validated watch set.
pub fn start_with<S, F>(
    config: &AppConfig,
    registry: &ProcessorRegistry,
    ctx: &ProcessorContext,
    make_source: F,
) -> Result<RunningWatcher, StartupError>
where
    S: EventSource + Send + 'static,
    F: FnOnce(&WatchSet) -> Result<S, crate::error::WatchSetupError>,
{
    config.validate()?;
    let watch_set = WatchSet::from_config(config)?;
    let pipeline = registry.build(config, ctx)?;
    watch_set.validate()?;

    for (name, dir) in pipeline.output_dirs() {
        if let Some(target) = watch_set.covering_target(dir) {
            return Err(ConfigError::InvalidOptions {
                name: name.to_string(),
                message: format!(
                    "output directory {} is inside watched directory {}",
                    dir.display(),
                    target.path.display()
                ),
            }
            .into());
        }
    }

    let source = make_source(&watch_set)?;

    let shutdown = ShutdownSignal::new();
    let mut event_loop = EventLoop::new(source, pipeline, shutdown.clone())
        .with_filter(MessageFilter::from_settings(&config.watch));
    if config.notify_failures {
        event_loop = event_loop.with_failure_notifier(Arc::clone(&ctx.notifier));
    }

    let handle = thread::Builder::new()
        .name("mailwatch-loop".to_string())
        .spawn(move || event_loop.run())?;

    Ok(RunningWatcher {
        watch_set,
        shutdown,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use crate::error::WatchSetupError;
    use crate::events::{RawEvent, ScriptedEventSource};
    use crate::notifier::RecordingNotifier;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_aborts_startup() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = AppConfig::with_default_notifier();
        config.watch.directories = vec![temp_dir.path().join("missing")];

        let mut source_built = false;
        let result = start_with(&config, &ProcessorRegistry::default(), &ProcessorContext::default(), |_| {
            source_built = true;
            Ok(ScriptedEventSource::default())
        });

        assert!(matches!(
            result,
            Err(StartupError::Watch(WatchSetupError::NotFound(_)))
        ));
        assert!(!source_built);
    }

    #[test]
    fn test_no_directories_aborts_startup() {
        let config = AppConfig::with_default_notifier();
        let result = start(&config, &ProcessorRegistry::default(), &ProcessorContext::default());

        match result {
            Err(err) => {
                assert!(matches!(err, StartupError::Config(ConfigError::NoDirectories)));
                assert_ne!(err.exit_code(), 0);
            }
            Ok(_) => panic!("startup should fail without directories"),
        }
    }

    #[test]
    fn test_scripted_run_dispatches_and_exits_when_source_closes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let msg = temp_dir.path().join("msg1");
        std::fs::write(&msg, "Subject: Hello\nFrom: a@x.com\n\nbody").expect("Failed to write file");

        let mut config = AppConfig::with_default_notifier();
        config.processors[0] = ProcessorConfig::new("NotifyProcessor", "popup", true)
            .with_directory(temp_dir.path());

        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = ProcessorContext::new(notifier.clone());
        let events = vec![RawEvent::created(&msg)];

        let running = start_with(&config, &ProcessorRegistry::default(), &ctx, move |_| {
            Ok(ScriptedEventSource::new(events))
        })
        .expect("Failed to start");

        assert_eq!(running.watch_set().len(), 1);
        let stats = running.wait();

        assert_eq!(stats.dispatched, 1);
        assert_eq!(notifier.notifications()[0].body, "Subject: Hello\nFrom: a@x.com");
        assert_eq!(notifier.notifications()[0].summary, format!("mailwatch: {}", msg.display()));
    }

    fn archive_config(watched: &std::path::Path, archive_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::with_default_notifier();
        config.watch.directories = vec![watched.to_path_buf()];
        config.processors.push(
            ProcessorConfig::new("ArchiveProcessor", "archive", true)
                .with_option("archive_dir", archive_dir.to_string_lossy().to_string()),
        );
        config
    }

    #[test]
    fn test_archive_under_watched_directory_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let out = temp_dir.path().join("out");
        std::fs::create_dir(&out).expect("Failed to create dir");

        let mut source_built = false;
        let result = start_with(
            &archive_config(&out, &out.join("archive")),
            &ProcessorRegistry::default(),
            &ProcessorContext::default(),
            |_| {
                source_built = true;
                Ok(ScriptedEventSource::default())
            },
        );

        match result {
            Err(StartupError::Config(ConfigError::InvalidOptions { name, .. })) => assert_eq!(name, "archive"),
            Err(other) => panic!("Unexpected error: {}", other),
            Ok(_) => panic!("Archiving into a watched tree must be rejected"),
        }
        assert!(!source_built);
    }

    #[test]
    fn test_archive_beside_non_recursive_directory_starts() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let out = temp_dir.path().join("out");
        std::fs::create_dir(&out).expect("Failed to create dir");

        let mut config = archive_config(&out, &out.join("archive"));
        config.watch.recursive = false;
        let running = start_with(&config, &ProcessorRegistry::default(), &ProcessorContext::default(), |_| {
            Ok(ScriptedEventSource::default())
        })
        .expect("Failed to start");
        running.wait();

        let outside = archive_config(&out, &temp_dir.path().join("archive"));
        let running = start_with(&outside, &ProcessorRegistry::default(), &ProcessorContext::default(), |_| {
            Ok(ScriptedEventSource::default())
        })
        .expect("Failed to start");
        running.wait();
    }
}
