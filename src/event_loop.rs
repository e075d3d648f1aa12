//! The watch-and-dispatch loop
//!
//! Blocks on an `EventSource`, filters each raw event down to "a complete
//! regular file exists at this path", parses it and runs it through the
//! pipeline. Events are handled one at a time in arrival order.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use crate::events::{EventPoll, EventSource, RawEvent, RawEventKind};
use crate::filter::MessageFilter;
use crate::message::Message;
use crate::notifier::{Notification, Notifier};
use crate::pipeline::{DispatchOutcome, Pipeline};
use crate::processors::ProcessResult;

/// How often the loop wakes to check for shutdown while idle.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cloneable stop flag shared between the loop and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Raw events taken from the source
    pub received: u64,
    /// Events that reached the pipeline
    pub dispatched: u64,
    /// Events filtered out or whose file vanished
    pub dropped: u64,
    /// Failed results across all dispatches
    pub failures: u64,
}

pub struct EventLoop<S: EventSource> {
    source: S,
    pipeline: Pipeline,
    filter: MessageFilter,
    shutdown: ShutdownSignal,
    failure_notifier: Option<Arc<dyn Notifier>>,
    stats: LoopStats,
}

impl<S: EventSource> EventLoop<S> {
    pub fn new(source: S, pipeline: Pipeline, shutdown: ShutdownSignal) -> Self {
        Self {
            source,
            pipeline,
            filter: MessageFilter::default(),
            shutdown,
            failure_notifier: None,
            stats: LoopStats::default(),
        }
    }

    pub fn with_filter(mut self, filter: MessageFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Report failed dispatches to this notifier.
    pub fn with_failure_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.failure_notifier = Some(notifier);
        self
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run until shutdown is signalled or the source closes.
    pub fn run(mut self) -> LoopStats {
        tracing::info!("Event loop active ({} processors)", self.pipeline.len());

        while !self.shutdown.is_triggered() {
            match self.source.next_event(POLL_INTERVAL) {
                EventPoll::Event(event) => {
                    self.handle_event(event);
                }
                EventPoll::Timeout => continue,
                EventPoll::Closed => {
                    tracing::debug!("Event source closed");
                    break;
                }
            }
        }

        tracing::info!(
            "Event loop terminated: {} received, {} dispatched, {} dropped, {} failures",
            self.stats.received,
            self.stats.dispatched,
            self.stats.dropped,
            self.stats.failures
        );
        self.stats
    }

    /// Filter, parse and dispatch one event. Returns `None` when the event
    /// was dropped before reaching the pipeline.
    pub fn handle_event(&mut self, event: RawEvent) -> Option<Vec<DispatchOutcome>> {
        self.stats.received += 1;

        let outcomes = self.dispatch_event(&event);
        match &outcomes {
            Some(results) => {
                self.stats.dispatched += 1;
                self.stats.failures += results.iter().filter(|o| o.result.is_failed()).count() as u64;
            }
            None => self.stats.dropped += 1,
        }
        outcomes
    }

    fn dispatch_event(&self, event: &RawEvent) -> Option<Vec<DispatchOutcome>> {
        if event.kind == RawEventKind::Other {
            return None;
        }

        if !self.filter.should_process(&event.path) {
            tracing::debug!("Ignored {:?}: {}", event.kind, event.path.display());
            return None;
        }

        let data = read_message_file(&event.path)?;
        let message = Message::parse(&data).with_source(event.path.clone());

        tracing::info!("New message: {}", event.path.display());
        let outcomes = self.pipeline.dispatch(&message);
        self.report(&event.path, &outcomes);
        Some(outcomes)
    }

    fn report(&self, path: &Path, outcomes: &[DispatchOutcome]) {
        for outcome in outcomes {
            match &outcome.result {
                ProcessResult::Delivered => {
                    tracing::info!("  {}: delivered", outcome.processor);
                }
                ProcessResult::Skipped(reason) => {
                    tracing::info!("  {}: skipped ({})", outcome.processor, reason);
                }
                ProcessResult::Failed(failure) => {
                    tracing::warn!("  {}: {} failed: {}", outcome.processor, path.display(), failure);
                    if let Some(notifier) = &self.failure_notifier {
                        notifier.notify(
                            Notification::new(
                                format!("Delivery failed: {}", outcome.processor),
                                format!("{}\n{}", path.display(), failure),
                            )
                            .with_icon("dialog-error"),
                        );
                    }
                }
            }
        }
    }
}

/// Read a file that just changed. A file deleted since the event fired is
/// skipped quietly, as is an empty file that is still being written.
fn read_message_file(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) if data.is_empty() => {
            tracing::debug!("Skipping empty file {}", path.display());
            None
        }
        Ok(data) => Some(data),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::debug!("File vanished before it could be read: {}", path.display());
            None
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {}", path.display(), err);
            None
        }
    }
}
