use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, ValueEnum};
use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::notifier::{CommandNotifier, LogNotifier, Notifier, DEFAULT_ICON};
use crate::processors::ProcessorContext;

#[derive(Parser)]
#[command(name = "mailwatch")]
#[command(version)]
#[command(about = "Watches drop directories for email messages and dispatches them to processors")]
#[command(long_about = "mailwatch monitors directories for new or modified message files, parses each one as an email and runs it through the configured processors: SMTP delivery, desktop notification and archival.")]
pub struct Cli {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(short, long, value_name = "FILE", help = "Config file name")]
    pub config: Option<PathBuf>,

    /// Extra directories to watch
    #[arg(short, long = "dir", value_name = "DIR", help = "Directory for watching")]
    pub dirs: Vec<PathBuf>,

    /// Watch only the top level of each directory
    #[arg(long, help = "Do not watch subdirectories")]
    pub no_recursive: bool,

    /// Icon for notification popups
    #[arg(long, default_value = DEFAULT_ICON, help = "Notification popup icon name")]
    pub notify_icon: String,

    /// Where notifications go
    #[arg(long, default_value = "log", help = "Notification backend")]
    pub notifier: NotifierKind,

    /// Program used by the command notifier
    #[arg(long, default_value = "notify-send", help = "Notification command")]
    pub notify_command: String,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum NotifierKind {
    /// Write notifications to the log
    Log,
    /// Run a desktop notification command
    Command,
}

impl Cli {
    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    /// Config file plus environment and command-line overrides. Without a
    /// config file every directory feeds a single notification processor.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::with_default_notifier(),
        };

        config.apply_env();

        if self.no_recursive {
            config.watch.recursive = false;
        }
        config.watch.directories.extend(self.dirs.iter().cloned());

        Ok(config)
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        match self.notifier {
            NotifierKind::Log => Arc::new(LogNotifier),
            NotifierKind::Command => Arc::new(CommandNotifier::new(self.notify_command.clone())),
        }
    }

    pub fn processor_context(&self) -> ProcessorContext {
        ProcessorContext::new(self.notifier()).with_default_icon(self.notify_icon.clone())
    }
}
