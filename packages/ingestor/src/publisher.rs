//! Transaction Sinks
//!
//! Parsed transactions leave the ingestor through two sinks: an append-only
//! [`TransactionStore`] and a one-way [`UiChannel`] toward the host UI.
//! Both are traits so the orchestrator can be handed Redis-backed clients in
//! production and in-process fakes in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::decoder::TransactionRecord;
use crate::inbox::{current_timestamp_millis, IncomingMessage};

/// Default Redis stream holding stored transactions
pub const DEFAULT_STREAM_KEY: &str = "sms_transactions";

/// Default Redis pub/sub channel for UI events
pub const DEFAULT_UI_CHANNEL: &str = "sms_ui";

/// Stream field carrying the JSON document
pub const DOCUMENT_FIELD: &str = "document";

/// Errors that can occur during publishing
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("UI channel closed")]
    ChannelClosed,

    #[error("Store rejected write: {0}")]
    Rejected(String),
}

/// Document appended to the transaction store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredTransaction {
    #[serde(flatten)]
    pub record: TransactionRecord,
    /// Originating address of the SMS
    pub sender: String,
    /// SMS receipt time in Unix milliseconds
    pub received_at: u64,
    /// Ingestion time in Unix milliseconds
    pub ingested_at: u64,
}

impl StoredTransaction {
    /// Build the stored document for a record parsed from `message`
    pub fn new(record: TransactionRecord, message: &IncomingMessage) -> Self {
        Self {
            record,
            sender: message.sender.clone(),
            received_at: message.timestamp_ms,
            ingested_at: current_timestamp_millis(),
        }
    }

    /// Serialize the document to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a document from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Event pushed to the host UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiEvent {
    /// One accepted live message
    Transaction { record: TransactionRecord },
    /// Collective result of an on-demand scan
    Transactions { records: Vec<TransactionRecord> },
    /// An on-demand scan found nothing
    NoResults,
    /// Short user-visible notice
    Notice { message: String },
}

impl UiEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        UiEvent::Notice {
            message: message.into(),
        }
    }

    /// Scan result: the records, or the explicit empty marker
    pub fn scan_result(records: Vec<TransactionRecord>) -> Self {
        if records.is_empty() {
            UiEvent::NoResults
        } else {
            UiEvent::Transactions { records }
        }
    }

    /// Serialize the event to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize an event from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Append-only store of parsed transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Append a document, returning its generated id
    async fn append(&self, doc: &StoredTransaction) -> Result<String, PublishError>;
}

/// One-way channel toward the host UI
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UiChannel: Send + Sync {
    async fn push(&self, event: UiEvent) -> Result<(), PublishError>;
}

/// Transaction store backed by a Redis stream
#[derive(Clone)]
pub struct RedisTransactionStore {
    connection: MultiplexedConnection,
    stream_key: String,
}

impl RedisTransactionStore {
    /// Create a store writing to `stream_key`
    ///
    /// # Arguments
    /// * `connection` - An established Redis multiplexed connection
    /// * `stream_key` - The stream the documents are appended to
    pub fn new(connection: MultiplexedConnection, stream_key: impl Into<String>) -> Self {
        Self {
            connection,
            stream_key: stream_key.into(),
        }
    }

    /// Create a store on the default stream
    pub fn with_default_stream(connection: MultiplexedConnection) -> Self {
        Self::new(connection, DEFAULT_STREAM_KEY)
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }
}

#[async_trait]
impl TransactionStore for RedisTransactionStore {
    async fn append(&self, doc: &StoredTransaction) -> Result<String, PublishError> {
        let json = doc.to_json()?;
        let mut connection = self.connection.clone();
        let id: String = connection
            .xadd(&self.stream_key, "*", &[(DOCUMENT_FIELD, json)])
            .await?;
        Ok(id)
    }
}

/// UI channel backed by Redis pub/sub
#[derive(Clone)]
pub struct RedisUiChannel {
    connection: MultiplexedConnection,
    channel: String,
}

impl RedisUiChannel {
    /// Create a channel publisher
    ///
    /// # Arguments
    /// * `connection` - An established Redis multiplexed connection
    /// * `channel` - The pub/sub channel name to publish to
    pub fn new(connection: MultiplexedConnection, channel: impl Into<String>) -> Self {
        Self {
            connection,
            channel: channel.into(),
        }
    }

    /// Create a publisher on the default channel
    pub fn with_default_channel(connection: MultiplexedConnection) -> Self {
        Self::new(connection, DEFAULT_UI_CHANNEL)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl UiChannel for RedisUiChannel {
    async fn push(&self, event: UiEvent) -> Result<(), PublishError> {
        let json = event.to_json()?;
        let mut connection = self.connection.clone();
        let _subscribers: i64 = connection.publish(&self.channel, &json).await?;
        Ok(())
    }
}

/// In-process store, ids are sequential
#[derive(Debug, Clone, Default)]
pub struct MemoryTransactionStore {
    docs: Arc<Mutex<Vec<StoredTransaction>>>,
    fail_next: Arc<Mutex<usize>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(&self) -> Vec<StoredTransaction> {
        self.docs.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }

    /// Make the next `count` appends fail
    pub fn set_fail_next(&self, count: usize) {
        *self.fail_next.lock() = count;
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn append(&self, doc: &StoredTransaction) -> Result<String, PublishError> {
        {
            let mut fail = self.fail_next.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(PublishError::Rejected("injected failure".to_string()));
            }
        }

        let mut docs = self.docs.lock();
        docs.push(doc.clone());
        Ok(format!("mem-{}", docs.len()))
    }
}

/// UI channel forwarding events into a tokio mpsc queue
#[derive(Debug, Clone)]
pub struct ChannelUiSink {
    sender: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelUiSink {
    /// Create the sink and the receiving end the UI drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl UiChannel for ChannelUiSink {
    async fn push(&self, event: UiEvent) -> Result<(), PublishError> {
        self.sender.send(event).map_err(|_| PublishError::ChannelClosed)
    }
}
