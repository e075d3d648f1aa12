use std::sync::Arc;
use serde::Deserialize;
use crate::config::ProcessorConfig;
use crate::error::ConfigError;
use crate::message::Message;
use crate::notifier::{Notification, Notifier};
use super::{ProcessResult, Processor, ProcessorContext};

#[derive(Debug, Default, Deserialize)]
struct DesktopOptions {
    icon: Option<String>,
    title: Option<String>,
}

/// Pops up a short summary of every message.
pub struct DesktopProcessor {
    name: String,
    title: String,
    icon: String,
    notifier: Arc<dyn Notifier>,
}

impl DesktopProcessor {
    pub fn configure(config: &ProcessorConfig, ctx: &ProcessorContext) -> Result<Self, ConfigError> {
        let options: DesktopOptions = config.parse_options()?;

        Ok(Self {
            name: config.name.clone(),
            title: options.title.unwrap_or_else(|| "mailwatch".to_string()),
            icon: options.icon.unwrap_or_else(|| ctx.default_icon.clone()),
            notifier: Arc::clone(&ctx.notifier),
        })
    }

    fn render(&self, message: &Message) -> Notification {
        let body = format!(
            "Subject: {}\nFrom: {}",
            message.subject().unwrap_or("(none)"),
            message.sender().unwrap_or("(unknown)")
        );
        let origin = match message.source() {
            Some(path) => path.display().to_string(),
            None => self.name.clone(),
        };
        Notification::new(format!("{}: {}", self.title, origin), body).with_icon(self.icon.clone())
    }
}

impl Processor for DesktopProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &'static str {
        "NotifyProcessor"
    }

    fn process(&self, message: &Message) -> ProcessResult {
        self.notifier.notify(self.render(message));
        ProcessResult::Delivered
    }
}
