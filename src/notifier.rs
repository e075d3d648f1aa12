//! User-visible notifications
//!
//! Notifications are fire-and-forget: a `Notifier` must return promptly and
//! never report whether the user saw anything.

use std::process::{Command, Stdio};
use std::sync::Mutex;

pub const DEFAULT_ICON: &str = "mail-message-new";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub summary: String,
    pub body: String,
    pub icon: String,
}

impl Notification {
    pub fn new(summary: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            body: body.into(),
            icon: DEFAULT_ICON.to_string(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        tracing::info!(
            target: "mailwatch::notification",
            icon = %notification.icon,
            "{} | {}",
            notification.summary,
            notification.body.replace('\n', " | ")
        );
    }
}

/// Runs a desktop notification command such as `notify-send`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CommandNotifier {
    fn default() -> Self {
        Self::new("notify-send")
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, notification: Notification) {
        let spawned = Command::new(&self.program)
            .arg("-i")
            .arg(&notification.icon)
            .arg(&notification.summary)
            .arg(&notification.body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // Reap in the background so the caller never waits on the desktop
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(err) => {
                tracing::warn!("Failed to run notifier '{}': {}", self.program, err);
            }
        }
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::default();
        notifier.notify(Notification::new("one", "a"));
        notifier.notify(Notification::new("two", "b").with_icon("mail-unread"));

        let sent = notifier.notifications();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].icon, DEFAULT_ICON);
        assert_eq!(sent[1].summary, "two");
        assert_eq!(sent[1].icon, "mail-unread");
    }

    #[test]
    fn test_command_notifier_survives_missing_program() {
        let notifier = CommandNotifier::new("mailwatch-no-such-notifier-binary");
        notifier.notify(Notification::new("summary", "body"));
    }
}
