use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use notify::event::{EventKind, ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawEventKind {
    Created,
    Modified,
    Other,
}

/// A single filesystem change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: RawEventKind,
}

impl RawEvent {
    pub fn new<P: Into<PathBuf>>(path: P, kind: RawEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn created<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, RawEventKind::Created)
    }

    pub fn modified<P: Into<PathBuf>>(path: P) -> Self {
        Self::new(path, RawEventKind::Modified)
    }

    /// Split a notify event into one `RawEvent` per path, preserving order.
    pub fn from_notify(event: notify::Event) -> Vec<RawEvent> {
        let kind = RawEventKind::from(&event.kind);
        event
            .paths
            .into_iter()
            .map(|path| RawEvent::new(path, kind))
            .collect()
    }
}

impl From<&EventKind> for RawEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => RawEventKind::Created,
            // A file renamed into a watched directory arrives complete
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawEventKind::Created,
            EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Other) => RawEventKind::Modified,
            _ => RawEventKind::Other,
        }
    }
}

/// Result of waiting on an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPoll {
    Event(RawEvent),
    Timeout,
    /// The source will never produce another event
    Closed,
}

/// Blocking supplier of raw filesystem events.
pub trait EventSource {
    /// Block for up to `timeout` waiting for the next event.
    fn next_event(&mut self, timeout: Duration) -> EventPoll;
}

/// Replays a fixed sequence of events, then reports `Closed`.
#[derive(Debug, Default)]
pub struct ScriptedEventSource {
    events: VecDeque<RawEvent>,
}

impl ScriptedEventSource {
    pub fn new<I: IntoIterator<Item = RawEvent>>(events: I) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for ScriptedEventSource {
    fn next_event(&mut self, _timeout: Duration) -> EventPoll {
        match self.events.pop_front() {
            Some(event) => EventPoll::Event(event),
            None => EventPoll::Closed,
        }
    }
}
