pub mod cli;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod events;
pub mod filter;
pub mod lifecycle;
pub mod message;
pub mod notifier;
pub mod pipeline;
pub mod processors;
pub mod watcher;
pub mod watchset;

pub use config::{AppConfig, ProcessorConfig, WatchSettings};
pub use error::{ConfigError, FailureKind, ProcessorFailure, StartupError, WatchSetupError};
pub use event_loop::{EventLoop, LoopStats, ShutdownSignal};
pub use events::{EventPoll, EventSource, RawEvent, RawEventKind, ScriptedEventSource};
pub use filter::MessageFilter;
pub use message::Message;
pub use pipeline::{dispatch, DispatchOutcome, Pipeline};
pub use processors::{ProcessResult, Processor, ProcessorContext, ProcessorRegistry};
pub use watcher::NotifyEventSource;
pub use watchset::{WatchSet, WatchTarget};
