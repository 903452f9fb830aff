//! `sms-ingest`: scan an exported inbox and push parsed transactions to Redis.
//!
//! Usage: `sms-ingest <inbox.jsonl>`. Settings come from `SMS_INGEST_*`
//! environment variables, see [`IngestorConfig::from_env`].

use std::error::Error;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{error, info};

use smsledger_ingestor::inbox::InboxFile;
use smsledger_ingestor::ingestor::{Ingestion, Ingestor};
use smsledger_ingestor::publisher::{RedisTransactionStore, RedisUiChannel};
use smsledger_ingestor::IngestorConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let Some(inbox_path) = std::env::args().nth(1) else {
        eprintln!("usage: sms-ingest <inbox.jsonl>");
        std::process::exit(2);
    };

    let config = IngestorConfig::from_env()?;
    info!("Connecting to Redis at {}", config.redis_url);
    let client = redis::Client::open(config.redis_url.as_str())?;
    let connection = client.get_multiplexed_async_connection().await?;

    let store = RedisTransactionStore::new(connection.clone(), config.stream_key.clone());
    let ui = RedisUiChannel::new(connection, config.ui_channel.clone());
    let ingestor = Ingestor::new(&config, Arc::new(store), Arc::new(ui), Handle::current());

    let source = InboxFile::new(&inbox_path);
    match ingestor.fetch_on_demand(&source) {
        Ingestion::Completed(report) => {
            info!(
                "Examined {} messages: {} accepted, {} rejected, {} unrecognized",
                report.examined,
                report.accepted.len(),
                report.rejected,
                report.unrecognized
            );
            report.pending.settle().await;
        }
        Ingestion::Skipped { reason, pending } => {
            error!("Scan skipped: {:?}", reason);
            pending.settle().await;
            std::process::exit(1);
        }
    }

    Ok(())
}
