//! Processor capability and variant registry
//!
//! A processor performs one side effect per message. Variants are selected
//! by the `class` string of their config record through `ProcessorRegistry`.

pub mod archive;
pub mod desktop;
pub mod smtp;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use crate::config::{AppConfig, ProcessorConfig};
use crate::error::{ConfigError, ProcessorFailure};
use crate::message::Message;
use crate::notifier::{LogNotifier, Notifier, DEFAULT_ICON};
use crate::pipeline::Pipeline;

pub use archive::ArchiveProcessor;
pub use desktop::DesktopProcessor;
pub use smtp::SmtpProcessor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    Delivered,
    Skipped(String),
    Failed(ProcessorFailure),
}

impl ProcessResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ProcessResult::Delivered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessResult::Failed(_))
    }
}

impl fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessResult::Delivered => f.write_str("delivered"),
            ProcessResult::Skipped(reason) => write!(f, "skipped ({})", reason),
            ProcessResult::Failed(failure) => write!(f, "failed ({})", failure),
        }
    }
}

pub trait Processor: Send {
    /// Name from the config record, used in logs.
    fn name(&self) -> &str;

    fn class(&self) -> &'static str;

    /// Perform the side effect for one message. Resources needed for it are
    /// acquired and released within the call.
    fn process(&self, message: &Message) -> ProcessResult;

    /// Directory this processor writes files into, if any. It must not be
    /// watched, or every output would come back as a new message.
    fn output_dir(&self) -> Option<&Path> {
        None
    }
}

/// Shared collaborators handed to processor factories.
#[derive(Clone)]
pub struct ProcessorContext {
    pub notifier: Arc<dyn Notifier>,
    pub default_icon: String,
}

impl ProcessorContext {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            default_icon: DEFAULT_ICON.to_string(),
        }
    }

    pub fn with_default_icon(mut self, icon: impl Into<String>) -> Self {
        self.default_icon = icon.into();
        self
    }
}

impl Default for ProcessorContext {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}

pub type ProcessorFactory =
    fn(&ProcessorConfig, &ProcessorContext) -> Result<Box<dyn Processor>, ConfigError>;

fn smtp_factory(
    config: &ProcessorConfig,
    ctx: &ProcessorContext,
) -> Result<Box<dyn Processor>, ConfigError> {
    Ok(Box::new(SmtpProcessor::configure(config, ctx)?))
}

fn desktop_factory(
    config: &ProcessorConfig,
    ctx: &ProcessorContext,
) -> Result<Box<dyn Processor>, ConfigError> {
    Ok(Box::new(DesktopProcessor::configure(config, ctx)?))
}

fn archive_factory(
    config: &ProcessorConfig,
    ctx: &ProcessorContext,
) -> Result<Box<dyn Processor>, ConfigError> {
    Ok(Box::new(ArchiveProcessor::configure(config, ctx)?))
}

/// Maps class identifiers to processor factories.
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in mail, desktop and archive variants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        for class in ["SmtpProcessor", "YagmailProcessor", "smtp"] {
            registry.register(class, smtp_factory);
        }
        for class in ["NotifyProcessor", "FilesystemProcessor", "notify"] {
            registry.register(class, desktop_factory);
        }
        for class in ["ArchiveProcessor", "archive"] {
            registry.register(class, archive_factory);
        }

        registry
    }

    pub fn register(&mut self, class: &str, factory: ProcessorFactory) {
        self.factories.insert(class.to_string(), factory);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Build one processor from its record.
    pub fn create(
        &self,
        config: &ProcessorConfig,
        ctx: &ProcessorContext,
    ) -> Result<Box<dyn Processor>, ConfigError> {
        let factory = self
            .factories
            .get(&config.class)
            .ok_or_else(|| ConfigError::UnknownClass {
                class: config.class.clone(),
                name: config.name.clone(),
            })?;
        factory(config, ctx)
    }

    /// Build the pipeline from every enabled record, in configured order.
    pub fn build(&self, config: &AppConfig, ctx: &ProcessorContext) -> Result<Pipeline, ConfigError> {
        let mut processors = Vec::new();
        for record in config.enabled_processors() {
            let processor = self.create(record, ctx)?;
            tracing::debug!("Configured processor {} ({})", processor.name(), processor.class());
            processors.push(processor);
        }
        Ok(Pipeline::new(processors))
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
