//! SMS Source Module
//!
//! Models the device messaging facility: live broadcasts made of one or more
//! parts, and a queryable inbox of historical messages. The facility itself
//! is reached through [`MessageSource`]; [`InboxFile`] reads an inbox export
//! in JSON-lines form.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Address used when a broadcast part carries none
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Errors that can occur while reading messages
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Inbox not found at path: {0}")]
    NotFound(String),

    #[error("Inbox query failed: {0}")]
    Query(#[from] std::io::Error),

    #[error("Malformed broadcast part: {0}")]
    MalformedPart(String),
}

/// A single SMS as delivered by the messaging facility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Originating address (phone number or alphanumeric short code)
    pub sender: String,
    /// Carrier service-center address, empty when unavailable
    pub service_center: String,
    /// Raw message text
    pub body: String,
    /// Receipt time in Unix milliseconds
    pub timestamp_ms: u64,
}

impl IncomingMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            sender: sender.into(),
            service_center: String::new(),
            body: body.into(),
            timestamp_ms,
        }
    }

    pub fn with_service_center(mut self, service_center: impl Into<String>) -> Self {
        self.service_center = service_center.into();
        self
    }
}

/// One segment of a new-message broadcast, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastPart {
    pub originating_address: Option<String>,
    pub service_center: Option<String>,
    pub body: Option<String>,
    pub timestamp_ms: u64,
}

impl BroadcastPart {
    /// Turn the part into a message. A missing sender becomes
    /// [`UNKNOWN_SENDER`]; a missing body is malformed.
    pub fn assemble(&self) -> Result<IncomingMessage, SourceError> {
        let body = self
            .body
            .clone()
            .ok_or_else(|| SourceError::MalformedPart("missing message body".to_string()))?;

        let sender = self
            .originating_address
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

        Ok(IncomingMessage {
            sender,
            service_center: self.service_center.clone().unwrap_or_default(),
            body,
            timestamp_ms: self.timestamp_ms,
        })
    }
}

impl From<IncomingMessage> for BroadcastPart {
    fn from(message: IncomingMessage) -> Self {
        Self {
            originating_address: Some(message.sender),
            service_center: Some(message.service_center).filter(|s| !s.is_empty()),
            body: Some(message.body),
            timestamp_ms: message.timestamp_ms,
        }
    }
}

/// A new-message broadcast; each part is filtered and parsed independently
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsBroadcast {
    pub parts: Vec<BroadcastPart>,
}

impl SmsBroadcast {
    pub fn new(parts: Vec<BroadcastPart>) -> Self {
        Self { parts }
    }

    /// Broadcast carrying a single well-formed message
    pub fn single(message: IncomingMessage) -> Self {
        Self {
            parts: vec![message.into()],
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Bounds applied to an inbox scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxQuery {
    /// Only messages received at or after this time (Unix millis)
    pub since_ms: Option<u64>,
    /// At most this many rows, newest first
    pub limit: Option<usize>,
}

impl InboxQuery {
    /// Query with no bounds
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Query covering `max_age` back from `now_ms`
    pub fn bounded(now_ms: u64, max_age: Option<Duration>, limit: Option<usize>) -> Self {
        let since_ms = max_age.map(|age| {
            let age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX);
            now_ms.saturating_sub(age_ms)
        });
        Self { since_ms, limit }
    }

    /// Apply the bounds to an arbitrary message list
    pub fn apply(&self, mut messages: Vec<IncomingMessage>) -> Vec<IncomingMessage> {
        if let Some(since) = self.since_ms {
            messages.retain(|m| m.timestamp_ms >= since);
        }
        messages.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        if let Some(limit) = self.limit {
            messages.truncate(limit);
        }
        messages
    }
}

/// The device messaging facility
pub trait MessageSource: Send + Sync {
    /// Whether the process may read messages at all
    fn has_read_permission(&self) -> bool;

    /// Historical messages, newest first, within the query bounds
    fn query_inbox(&self, query: &InboxQuery) -> Result<Vec<IncomingMessage>, SourceError>;
}

/// Get current timestamp in milliseconds
pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Row layout of an inbox export
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboxRow {
    address: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    date: u64,
    #[serde(default)]
    service_center: Option<String>,
}

impl From<InboxRow> for IncomingMessage {
    fn from(row: InboxRow) -> Self {
        IncomingMessage {
            sender: row
                .address
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
            service_center: row.service_center.unwrap_or_default(),
            body: row.body,
            timestamp_ms: row.date,
        }
    }
}

/// Inbox exported as JSON lines, one message object per line
#[derive(Debug, Clone)]
pub struct InboxFile {
    path: PathBuf,
}

impl InboxFile {
    pub fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(expand_path(path)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<IncomingMessage>, SourceError> {
        if !self.path.exists() {
            return Err(SourceError::NotFound(self.path.display().to_string()));
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut messages = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InboxRow>(&line) {
                Ok(row) => messages.push(row.into()),
                Err(e) => warn!("Skipping malformed inbox row {}: {}", index + 1, e),
            }
        }

        debug!("Read {} messages from {}", messages.len(), self.path.display());
        Ok(messages)
    }
}

impl MessageSource for InboxFile {
    fn has_read_permission(&self) -> bool {
        File::open(&self.path).is_ok()
    }

    fn query_inbox(&self, query: &InboxQuery) -> Result<Vec<IncomingMessage>, SourceError> {
        info!("Scanning inbox export at {}", self.path.display());
        let rows = self.read_rows()?;
        Ok(query.apply(rows))
    }
}
