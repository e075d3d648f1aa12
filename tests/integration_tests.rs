use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use mailwatch::{
    lifecycle, AppConfig, ConfigError, Message, ProcessResult, Processor, ProcessorConfig,
    ProcessorContext, ProcessorRegistry, StartupError, WatchSetupError,
};

/// Subjects seen by `RecordingProcessor`, keyed by processor name.
fn recorded() -> &'static Mutex<Vec<(String, String)>> {
    static RECORDED: OnceLock<Mutex<Vec<(String, String)>>> = OnceLock::new();
    RECORDED.get_or_init(|| Mutex::new(Vec::new()))
}

struct RecordingProcessor {
    name: String,
}

impl Processor for RecordingProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &'static str {
        "RecordingProcessor"
    }

    fn process(&self, message: &Message) -> ProcessResult {
        let subject = message.subject().unwrap_or_default().to_string();
        recorded().lock().unwrap().push((self.name.clone(), subject));
        ProcessResult::Delivered
    }
}

fn recording_factory(
    config: &ProcessorConfig,
    _ctx: &ProcessorContext,
) -> Result<Box<dyn Processor>, ConfigError> {
    Ok(Box::new(RecordingProcessor {
        name: config.name.clone(),
    }))
}

fn registry() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::with_builtins();
    registry.register("RecordingProcessor", recording_factory);
    registry
}

fn subjects_for(name: &str) -> Vec<String> {
    recorded()
        .lock()
        .unwrap()
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, s)| s.clone())
        .collect()
}

fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

#[test]
fn test_written_message_reaches_processor() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let outbox = temp_dir.path().join("out");
    fs::create_dir(&outbox).expect("Failed to create outbox");

    let config = AppConfig {
        processors: vec![ProcessorConfig::new("RecordingProcessor", "e2e-recorder", true).with_directory(&outbox)],
        ..AppConfig::default()
    };

    let running = lifecycle::start(&config, &registry(), &ProcessorContext::default())
        .expect("Failed to start watcher");
    assert_eq!(running.watch_set().paths().collect::<Vec<_>>(), vec![outbox.as_path()]);

    // Give the native watcher a moment to settle before writing
    std::thread::sleep(Duration::from_millis(100));
    fs::write(outbox.join("msg1"), "Subject: Hello\r\nFrom: a@x.com\r\n\r\nHi\r\n")
        .expect("Failed to write message");

    let seen = wait_for(
        || subjects_for("e2e-recorder").iter().any(|s| s == "Hello"),
        Duration::from_secs(5),
    );

    let stats = running.stop();
    assert!(seen, "Processor never saw the message");
    assert!(stats.dispatched >= 1);
}

#[test]
fn test_files_in_subdirectories_are_seen_when_recursive() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let nested = temp_dir.path().join("a").join("b");
    fs::create_dir_all(&nested).expect("Failed to create nested dirs");

    let config = AppConfig {
        processors: vec![ProcessorConfig::new("RecordingProcessor", "nested-recorder", true)
            .with_directory(temp_dir.path())
            .with_recursive(true)],
        ..AppConfig::default()
    };

    let running = lifecycle::start(&config, &registry(), &ProcessorContext::default())
        .expect("Failed to start watcher");

    std::thread::sleep(Duration::from_millis(100));
    fs::write(nested.join("deep"), "Subject: Deep\n\nbody").expect("Failed to write message");

    let seen = wait_for(
        || subjects_for("nested-recorder").iter().any(|s| s == "Deep"),
        Duration::from_secs(5),
    );
    running.stop();

    assert!(seen, "Nested message was not dispatched");
}

#[test]
fn test_nonexistent_directory_fails_startup() {
    let config = AppConfig {
        processors: vec![ProcessorConfig::new("RecordingProcessor", "missing", true)
            .with_directory(PathBuf::from("/definitely/not/a/real/mailwatch/dir"))],
        ..AppConfig::default()
    };

    match lifecycle::start(&config, &registry(), &ProcessorContext::default()) {
        Err(err) => {
            assert!(matches!(err, StartupError::Watch(WatchSetupError::NotFound(_))));
            assert_ne!(err.exit_code(), 0);
        }
        Ok(_) => panic!("Startup should fail for a missing directory"),
    }
}

#[test]
fn test_disabled_only_directories_fail_startup() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = AppConfig {
        processors: vec![
            ProcessorConfig::new("RecordingProcessor", "off", false).with_directory(temp_dir.path()),
            ProcessorConfig::new("NotifyProcessor", "popup", true),
        ],
        ..AppConfig::default()
    };

    match lifecycle::start(&config, &registry(), &ProcessorContext::default()) {
        Err(err) => assert!(matches!(err, StartupError::Config(ConfigError::NoDirectories))),
        Ok(_) => panic!("Startup should fail without an enabled directory"),
    }
}

#[test]
fn test_invalid_processor_options_fail_startup() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = AppConfig {
        processors: vec![ProcessorConfig::new("SmtpProcessor", "mailer", true).with_directory(temp_dir.path())],
        ..AppConfig::default()
    };

    match lifecycle::start(&config, &registry(), &ProcessorContext::default()) {
        Err(err) => assert!(matches!(
            err,
            StartupError::Config(ConfigError::MissingOption { .. })
        )),
        Ok(_) => panic!("Startup should fail when the mailer has no host"),
    }
}

#[test]
fn test_original_json_config_starts() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("sendmail.json");
    let json = format!(
        r#"[
            {{"class": "FilesystemProcessor", "enabled": true, "name": "outbox", "directory": {dir:?}}},
            {{"class": "SmtpProcessor", "enabled": false, "name": "mailer", "host": "smtp.example.com"}}
        ]"#,
        dir = temp_dir.path().to_string_lossy()
    );
    fs::write(&config_path, json).expect("Failed to write config");

    let config = AppConfig::load(&config_path).expect("Failed to load config");
    let running = lifecycle::start(&config, &registry(), &ProcessorContext::default())
        .expect("Failed to start watcher");

    assert_eq!(running.watch_set().len(), 1);
    running.stop();
}

#[test]
fn test_shutdown_returns_promptly_when_idle() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = AppConfig {
        processors: vec![ProcessorConfig::new("RecordingProcessor", "idle", true).with_directory(temp_dir.path())],
        ..AppConfig::default()
    };

    let running = lifecycle::start(&config, &registry(), &ProcessorContext::default())
        .expect("Failed to start watcher");

    let signal = running.shutdown_signal();
    let started = Instant::now();
    signal.trigger();
    let stats = running.wait();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(stats.dispatched, 0);
}

#[test]
fn test_archive_inside_dir_flag_directory_fails_startup() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let outbox = temp_dir.path().join("out");
    fs::create_dir(&outbox).expect("Failed to create outbox");

    // What `mailwatch -d out` with an archive configured under it produces
    let mut config = AppConfig::with_default_notifier();
    config.watch.directories = vec![outbox.clone()];
    config.processors.push(
        ProcessorConfig::new("ArchiveProcessor", "archive", true)
            .with_option("archive_dir", outbox.join("archive").to_string_lossy().to_string()),
    );

    match lifecycle::start(&config, &registry(), &ProcessorContext::default()) {
        Err(err) => {
            assert!(matches!(err, StartupError::Config(ConfigError::InvalidOptions { .. })));
            assert_ne!(err.exit_code(), 0);
        }
        Ok(running) => {
            running.stop();
            panic!("Startup should refuse an archive inside a watched directory");
        }
    }
    assert!(!outbox.join("archive").exists());
}
