//! SMTP delivery
//!
//! Relays the message as-is over SMTP with lettre. The transport is built
//! inside `process` and dropped when it returns; nothing is held between
//! messages.

use std::time::Duration;
use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use serde::Deserialize;
use crate::config::ProcessorConfig;
use crate::error::{ConfigError, FailureKind, ProcessorFailure};
use crate::message::Message;
use super::{ProcessResult, Processor, ProcessorContext};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// Implicit TLS from the first byte
    Tls,
    #[default]
    Starttls,
    /// Plain text, for local relays only
    None,
}

impl Security {
    fn default_port(self) -> u16 {
        match self {
            Security::Tls => 465,
            Security::Starttls => 587,
            Security::None => 25,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SmtpOptions {
    host: Option<String>,
    port: Option<u16>,
    #[serde(default)]
    security: Security,
    #[serde(alias = "user")]
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
    #[serde(alias = "to_address")]
    to: Option<OneOrMany>,
    timeout_secs: Option<u64>,
}

/// Mail delivery processor.
#[derive(Debug)]
pub struct SmtpProcessor {
    name: String,
    host: String,
    port: u16,
    security: Security,
    credentials: Option<(String, String)>,
    from: Option<Address>,
    to: Vec<Address>,
    timeout: Duration,
}

impl SmtpProcessor {
    pub fn configure(config: &ProcessorConfig, _ctx: &ProcessorContext) -> Result<Self, ConfigError> {
        let options: SmtpOptions = config.parse_options()?;
        let invalid = |message: String| ConfigError::InvalidOptions {
            name: config.name.clone(),
            message,
        };

        let host = options
            .host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingOption {
                name: config.name.clone(),
                key: "host".to_string(),
            })?;

        let credentials = match (options.username, options.password) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => return Err(invalid("username and password must be set together".to_string())),
        };

        let from = options
            .from
            .map(|f| f.parse::<Address>().map_err(|e| invalid(format!("invalid from address '{}': {}", f, e))))
            .transpose()?;

        let to = options
            .to
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.parse::<Address>().map_err(|e| invalid(format!("invalid to address '{}': {}", t, e))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            port: options.port.unwrap_or_else(|| options.security.default_port()),
            host,
            security: options.security,
            credentials,
            from,
            to,
            timeout: Duration::from_secs(options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }

    pub fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    fn transport(&self) -> Result<SmtpTransport, ProcessorFailure> {
        let builder = match self.security {
            Security::Tls => SmtpTransport::relay(&self.host),
            Security::Starttls => SmtpTransport::starttls_relay(&self.host),
            Security::None => Ok(SmtpTransport::builder_dangerous(&self.host)),
        }
        .map_err(|e| ProcessorFailure::from_error(FailureKind::Transport, &e))?;

        let mut builder = builder.port(self.port).timeout(Some(self.timeout));
        if let Some((user, pass)) = &self.credentials {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(builder.build())
    }

    fn envelope(&self, message: &Message) -> Result<Envelope, ProcessorFailure> {
        let from = match &self.from {
            Some(from) => from.clone(),
            None => {
                let sender = message.sender().ok_or_else(|| {
                    ProcessorFailure::new(FailureKind::InvalidMessage, "message has no sender")
                })?;
                parse_address(sender)?
            }
        };

        let to = if self.to.is_empty() {
            message
                .recipients()
                .iter()
                .map(|r| parse_address(r))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            self.to.clone()
        };

        if to.is_empty() {
            return Err(ProcessorFailure::new(FailureKind::InvalidMessage, "message has no recipients"));
        }

        Envelope::new(Some(from), to)
            .map_err(|e| ProcessorFailure::from_error(FailureKind::InvalidMessage, &e))
    }

    fn send(&self, message: &Message) -> Result<(), ProcessorFailure> {
        let envelope = self.envelope(message)?;
        let transport = self.transport()?;

        transport
            .send_raw(&envelope, &payload(message))
            .map_err(|e| ProcessorFailure::from_error(FailureKind::Transport, &e))?;
        Ok(())
    }
}

/// Bytes handed to the relay: the message as read, minus `Bcc`.
fn payload(message: &Message) -> Vec<u8> {
    to_crlf(&message.to_wire_without(&["Bcc"]))
}

/// SMTP requires CRLF line endings; files on disk often use bare LF.
fn to_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 32);
    let mut prev = 0u8;
    for &b in bytes {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}

fn parse_address(raw: &str) -> Result<Address, ProcessorFailure> {
    // Accept both bare addresses and "Name <addr>" forms
    let addr = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    addr.trim().parse::<Address>().map_err(|e| {
        ProcessorFailure::new(FailureKind::InvalidMessage, format!("invalid address '{}': {}", raw, e))
    })
}

impl Processor for SmtpProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> &'static str {
        "SmtpProcessor"
    }

    fn process(&self, message: &Message) -> ProcessResult {
        if message.is_degraded() {
            return ProcessResult::Skipped("content is not an email message".to_string());
        }

        tracing::info!("  - {}: {}.process()", self.name, self.class());
        match self.send(message) {
            Ok(()) => ProcessResult::Delivered,
            Err(failure) => ProcessResult::Failed(failure),
        }
    }
}
