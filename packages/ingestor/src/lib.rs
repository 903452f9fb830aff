//! SMS Ledger Ingestor Library
//!
//! This crate provides components for ingesting mobile-money SMS
//! notifications from trusted senders, parsing them into transaction
//! records, and forwarding those records to a store and a UI channel.

pub mod config;
pub mod decoder;
pub mod filter;
pub mod inbox;
pub mod ingestor;
pub mod publisher;

// Re-export commonly used types
pub use config::IngestorConfig;
pub use decoder::{parse_message, TemplateRegistry, TransactionRecord};
pub use filter::{is_eligible, FilterMode, TrustedSenderPolicy};
pub use inbox::{IncomingMessage, InboxFile, MessageSource, SmsBroadcast};
pub use ingestor::{Ingestion, Ingestor};
pub use publisher::{TransactionStore, UiChannel, UiEvent};
