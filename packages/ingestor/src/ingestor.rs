//! Ingestion Orchestrator
//!
//! Wires filter → decoder → sinks for the two entry points: live broadcasts
//! and on-demand inbox scans. Both paths make their accept/reject decision
//! synchronously and hand persistence and UI notification to spawned tasks
//! they never await.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::IngestorConfig;
use crate::decoder::{TemplateRegistry, TransactionRecord};
use crate::filter::{is_eligible, FilterMode, PolicyHandle, TrustedSenderPolicy};
use crate::inbox::{current_timestamp_millis, InboxQuery, IncomingMessage, MessageSource, SmsBroadcast};
use crate::publisher::{StoredTransaction, TransactionStore, UiChannel, UiEvent};

/// Notice shown when messages cannot be read
pub const PERMISSION_NOTICE: &str = "SMS permission is required to receive messages.";

/// Why an ingestion call did no work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The messaging facility refused read access
    PermissionDenied,
    /// The inbox could not be queried
    SourceUnavailable(String),
}

/// Sink tasks spawned by an ingestion call
///
/// The orchestrator never awaits these. Callers that must outlive them,
/// such as a process about to exit, can [`PendingWrites::settle`].
#[derive(Debug, Default)]
pub struct PendingWrites {
    tasks: Vec<JoinHandle<()>>,
}

impl PendingWrites {
    fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every spawned sink task to finish
    pub async fn settle(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Sink task failed to complete: {}", e);
            }
        }
    }
}

/// Tally of one ingestion call
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Messages looked at
    pub examined: usize,
    /// Records produced, in examination order
    pub accepted: Vec<TransactionRecord>,
    /// Messages refused by the sender/keyword filter
    pub rejected: usize,
    /// Trusted messages no template recognized
    pub unrecognized: usize,
    /// Broadcast parts that could not be assembled
    pub malformed: usize,
    /// Spawned sink tasks
    pub pending: PendingWrites,
}

/// Result of an ingestion call
#[derive(Debug)]
#[must_use]
pub enum Ingestion {
    /// No message was examined; `pending` holds the notice sent to the UI
    Skipped { reason: SkipReason, pending: PendingWrites },
    Completed(IngestReport),
}

impl Ingestion {
    pub fn report(&self) -> Option<&IngestReport> {
        match self {
            Ingestion::Completed(report) => Some(report),
            Ingestion::Skipped { .. } => None,
        }
    }

    pub fn into_report(self) -> Option<IngestReport> {
        match self {
            Ingestion::Completed(report) => Some(report),
            Ingestion::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Ingestion::Skipped { .. })
    }

    /// Sink tasks spawned by the call, whichever way it went
    pub fn into_pending(self) -> PendingWrites {
        match self {
            Ingestion::Completed(report) => report.pending,
            Ingestion::Skipped { pending, .. } => pending,
        }
    }
}

enum Verdict {
    Rejected,
    Unrecognized,
    Accepted(TransactionRecord),
}

/// Transaction-SMS ingestor
pub struct Ingestor {
    policy: PolicyHandle,
    filter_mode: FilterMode,
    registry: TemplateRegistry,
    scan_max_age: Option<Duration>,
    scan_limit: Option<usize>,
    store: Arc<dyn TransactionStore>,
    ui: Arc<dyn UiChannel>,
    runtime: Handle,
}

impl Ingestor {
    /// Create an ingestor
    ///
    /// # Arguments
    /// * `config` - Initial policy, filter mode and scan bounds
    /// * `store` - Sink for stored transactions
    /// * `ui` - Sink for UI events
    /// * `runtime` - Runtime the fire-and-forget sink tasks are spawned on
    pub fn new(
        config: &IngestorConfig,
        store: Arc<dyn TransactionStore>,
        ui: Arc<dyn UiChannel>,
        runtime: Handle,
    ) -> Self {
        Self {
            policy: PolicyHandle::new(config.policy()),
            filter_mode: config.filter_mode,
            registry: TemplateRegistry::builtin(),
            scan_max_age: config.scan_max_age,
            scan_limit: config.scan_limit,
            store,
            ui,
            runtime,
        }
    }

    /// Replace the template registry
    pub fn with_registry(mut self, registry: TemplateRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Handle to the live policy, shared with anything that updates it
    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    /// Replace the trusted-sender list wholesale; applies to every later
    /// evaluation
    pub fn update_trusted_service_patterns<I, S>(&self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let policy = TrustedSenderPolicy::new(patterns);
        info!("Trusted sender patterns updated: {:?}", policy.patterns());
        self.policy.replace(policy);
    }

    fn judge(&self, policy: &TrustedSenderPolicy, message: &IncomingMessage) -> Verdict {
        if !is_eligible(policy, self.filter_mode, &message.sender, &message.body) {
            debug!("Rejected message from '{}'", message.sender);
            return Verdict::Rejected;
        }
        match self.registry.parse(&message.body) {
            Some(record) => Verdict::Accepted(record),
            None => {
                debug!("Unrecognized message body from '{}'", message.sender);
                Verdict::Unrecognized
            }
        }
    }

    /// Filter and parse a single message without touching any sink
    pub fn evaluate(&self, message: &IncomingMessage) -> Option<TransactionRecord> {
        let policy = self.policy.snapshot();
        match self.judge(&policy, message) {
            Verdict::Accepted(record) => Some(record),
            Verdict::Rejected | Verdict::Unrecognized => None,
        }
    }

    /// Handle a new-message broadcast
    ///
    /// Each part is assembled, filtered and parsed on its own; a bad part
    /// never stops its siblings. Every record is stored and pushed to the UI
    /// individually.
    pub fn on_broadcast(&self, source: &dyn MessageSource, broadcast: SmsBroadcast) -> Ingestion {
        if !source.has_read_permission() {
            return self.skip(SkipReason::PermissionDenied);
        }

        let policy = self.policy.snapshot();
        let mut report = IngestReport::default();

        for part in &broadcast.parts {
            let message = match part.assemble() {
                Ok(message) => message,
                Err(e) => {
                    warn!("Skipping broadcast part: {}", e);
                    report.malformed += 1;
                    continue;
                }
            };
            report.examined += 1;

            match self.judge(&policy, &message) {
                Verdict::Rejected => report.rejected += 1,
                Verdict::Unrecognized => report.unrecognized += 1,
                Verdict::Accepted(record) => {
                    info!(
                        "Accepted {} transaction {} from '{}'",
                        record.status().as_str(),
                        record.transaction_id(),
                        message.sender
                    );
                    report.pending.push(self.spawn_store(record.clone(), &message));
                    report.pending.push(self.spawn_ui(UiEvent::Transaction {
                        record: record.clone(),
                    }));
                    report.accepted.push(record);
                }
            }
        }

        Ingestion::Completed(report)
    }

    /// Scan the inbox on request
    ///
    /// Every accepted row is stored individually; the UI receives one event
    /// carrying all records, or an explicit no-results marker.
    pub fn fetch_on_demand(&self, source: &dyn MessageSource) -> Ingestion {
        if !source.has_read_permission() {
            return self.skip(SkipReason::PermissionDenied);
        }

        let query = InboxQuery::bounded(current_timestamp_millis(), self.scan_max_age, self.scan_limit);
        let messages = match source.query_inbox(&query) {
            Ok(messages) => messages,
            Err(e) => {
                error!("Inbox scan failed: {}", e);
                return self.skip(SkipReason::SourceUnavailable(e.to_string()));
            }
        };

        let policy = self.policy.snapshot();
        let mut report = IngestReport::default();

        for message in &messages {
            report.examined += 1;
            match self.judge(&policy, message) {
                Verdict::Rejected => report.rejected += 1,
                Verdict::Unrecognized => report.unrecognized += 1,
                Verdict::Accepted(record) => {
                    report.pending.push(self.spawn_store(record.clone(), message));
                    report.accepted.push(record);
                }
            }
        }

        info!(
            "Inbox scan examined {} messages, accepted {}",
            report.examined,
            report.accepted.len()
        );
        let event = UiEvent::scan_result(report.accepted.clone());
        report.pending.push(self.spawn_ui(event));

        Ingestion::Completed(report)
    }

    fn skip(&self, reason: SkipReason) -> Ingestion {
        let notice = match &reason {
            SkipReason::PermissionDenied => {
                error!("SMS permission not granted");
                PERMISSION_NOTICE.to_string()
            }
            SkipReason::SourceUnavailable(e) => format!("Could not read messages: {}", e),
        };
        let mut pending = PendingWrites::default();
        pending.push(self.spawn_ui(UiEvent::notice(notice)));
        Ingestion::Skipped { reason, pending }
    }

    fn spawn_store(&self, record: TransactionRecord, message: &IncomingMessage) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let ui = Arc::clone(&self.ui);
        let doc = StoredTransaction::new(record, message);

        self.runtime.spawn(async move {
            match store.append(&doc).await {
                Ok(id) => debug!("Stored transaction {} as {}", doc.record.transaction_id(), id),
                Err(e) => {
                    warn!("Failed to store transaction {}: {}", doc.record.transaction_id(), e);
                    let notice = UiEvent::notice(format!("Failed to save transaction: {}", e));
                    if let Err(e) = ui.push(notice).await {
                        warn!("Failed to notify UI of store failure: {}", e);
                    }
                }
            }
        })
    }

    fn spawn_ui(&self, event: UiEvent) -> JoinHandle<()> {
        let ui = Arc::clone(&self.ui);

        self.runtime.spawn(async move {
            if let Err(e) = ui.push(event).await {
                warn!("Failed to push UI event: {}", e);
            }
        })
    }
}
