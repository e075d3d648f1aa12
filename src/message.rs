//! Message parsing boundary
//!
//! Turns the raw bytes of a dropped file into a `Message`. Parsing never
//! fails: content that does not look like an RFC 5322 header block degrades
//! to a message with no headers whose body is the whole text.
//!
//! The raw bytes are kept as they arrived. Decoded text is only a view for
//! header lookup and notifications; anything written back out (relay,
//! archive) uses the original bytes.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use mail_parser::MessageParser;
use regex::Regex;
use serde::Serialize;

fn header_line() -> &'static Regex {
    static HEADER_LINE: OnceLock<Regex> = OnceLock::new();
    // field-name is any printable ASCII except ':' (RFC 5322 section 3.6.8)
    HEADER_LINE.get_or_init(|| Regex::new(r"^([!-9;-~]+):[ \t]*(.*)$").expect("valid header regex"))
}

/// Values decoded by mail-parser for well-formed messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MailSummary {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct HeaderField {
    name: String,
    /// Unfolded, lossily decoded value
    value: String,
    /// Bytes of the field in the raw input, continuation lines included
    span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    #[serde(skip)]
    raw: Vec<u8>,
    headers: Vec<HeaderField>,
    /// Start of the empty line ending the header block
    separator: usize,
    body_start: usize,
    body: String,
    summary: Option<MailSummary>,
    source: Option<PathBuf>,
}

struct HeaderBlock {
    fields: Vec<HeaderField>,
    separator: usize,
    body_start: usize,
}

impl Message {
    /// Parse raw file content. Never fails.
    pub fn parse(raw: &[u8]) -> Self {
        match split_headers(raw) {
            Some(block) => Self {
                body: String::from_utf8_lossy(&raw[block.body_start..]).into_owned(),
                summary: summarize(raw),
                headers: block.fields,
                separator: block.separator,
                body_start: block.body_start,
                raw: raw.to_vec(),
                source: None,
            },
            None => Self::degraded(raw),
        }
    }

    fn degraded(raw: &[u8]) -> Self {
        Self {
            raw: raw.to_vec(),
            headers: Vec::new(),
            separator: 0,
            body_start: 0,
            body: String::from_utf8_lossy(raw).into_owned(),
            summary: None,
            source: None,
        }
    }

    /// Record the file the message was read from.
    pub fn with_source<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_all(name).next()
    }

    pub fn header_all<'a: 'n, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + 'n {
        self.headers
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Headers in the order they appeared in the file.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|h| (h.name.as_str(), h.value.as_str()))
    }

    /// Body decoded for display. Invalid UTF-8 is replaced.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Body exactly as it appeared in the file.
    pub fn raw_body(&self) -> &[u8] {
        &self.raw[self.body_start..]
    }

    /// The file content as read.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// True when the content had no recognizable header block.
    pub fn is_degraded(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn subject(&self) -> Option<&str> {
        self.summary
            .as_ref()
            .and_then(|s| s.subject.as_deref())
            .or_else(|| self.header("Subject"))
    }

    /// Sender address, decoded when possible.
    pub fn sender(&self) -> Option<&str> {
        self.summary
            .as_ref()
            .and_then(|s| s.from.as_deref())
            .or_else(|| self.header("From"))
    }

    /// Addresses from `To`, `Cc` and `Bcc`.
    pub fn recipients(&self) -> &[String] {
        self.summary
            .as_ref()
            .map(|s| s.recipients.as_slice())
            .unwrap_or(&[])
    }

    /// Message bytes for output, without any mbox envelope line.
    pub fn to_wire(&self) -> Vec<u8> {
        self.to_wire_without(&[])
    }

    /// Like `to_wire`, dropping every field whose name is in `excluded`.
    /// Kept fields and the body are copied byte for byte.
    pub fn to_wire_without(&self, excluded: &[&str]) -> Vec<u8> {
        if self.is_degraded() {
            return self.raw.clone();
        }

        let mut out = Vec::with_capacity(self.raw.len());
        for field in &self.headers {
            if !excluded.iter().any(|name| field.name.eq_ignore_ascii_case(name)) {
                out.extend_from_slice(&self.raw[field.span.clone()]);
            }
        }
        out.extend_from_slice(&self.raw[self.separator..]);
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_wire()))
    }
}

/// Split raw input into unfolded header fields and the offset of the body
/// that follows the first empty line. Returns `None` when the header block
/// is malformed.
fn split_headers(raw: &[u8]) -> Option<HeaderBlock> {
    let mut fields: Vec<HeaderField> = Vec::new();
    let mut offset = 0;

    for (index, line) in raw.split_inclusive(|&b| b == b'\n').enumerate() {
        let start = offset;
        offset += line.len();
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim_end_matches(['\r', '\n']);

        // mbox envelope line
        if index == 0 && trimmed.starts_with("From ") {
            continue;
        }

        if trimmed.is_empty() {
            if fields.is_empty() {
                return None;
            }
            return Some(HeaderBlock {
                fields,
                separator: start,
                body_start: offset,
            });
        }

        if trimmed.starts_with([' ', '\t']) {
            let field = fields.last_mut()?;
            field.span.end = offset;
            let folded = trimmed.trim();
            if !folded.is_empty() {
                if !field.value.is_empty() {
                    field.value.push(' ');
                }
                field.value.push_str(folded);
            }
            continue;
        }

        let caps = header_line().captures(trimmed)?;
        fields.push(HeaderField {
            name: caps[1].to_string(),
            value: caps[2].trim_end().to_string(),
            span: start..offset,
        });
    }

    // Header block ran to end of input: headers only, empty body
    if fields.is_empty() {
        None
    } else {
        Some(HeaderBlock {
            fields,
            separator: raw.len(),
            body_start: raw.len(),
        })
    }
}

fn summarize(raw: &[u8]) -> Option<MailSummary> {
    let parsed = MessageParser::default().parse(raw)?;

    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string());

    let mut recipients = extract_addresses(parsed.to());
    recipients.extend(extract_addresses(parsed.cc()));
    recipients.extend(extract_addresses(parsed.bcc()));

    Some(MailSummary {
        subject: parsed.subject().map(|s| s.to_string()),
        from,
        recipients,
    })
}

fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| {
                g.addresses
                    .iter()
                    .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            })
            .collect(),
    }
}
