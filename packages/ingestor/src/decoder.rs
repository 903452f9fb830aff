//! Message Body Decoder
//!
//! Parses trusted SMS bodies into structured transaction records.
//! Each supported notification format is a [`MessageTemplate`]: a literal
//! prefix used for dispatch, a full-body regex, and an extractor that maps
//! named capture groups onto a [`TransactionRecord`].
//!
//! Dispatch is by exact prefix. Once a prefix matches, only that template's
//! regex is tried; a body that does not conform yields no record at all.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Reason attached to every insufficient-funds failure
pub const INSUFFICIENT_FUNDS_REASON: &str = "Insufficient funds";

/// Prefix of an Airtel Money till payment confirmation
pub const PAYMENT_PREFIX: &str = "Payment of";

/// Prefix of an Airtel Money insufficient-funds rejection
pub const FAILED_PREFIX: &str = "FAILED.TID";

const PAYMENT_PATTERN: &str = r"^Payment of ZMW (?P<amount>\d+\.\d{2}) Till Number (?P<till>\d+) (?P<name>[A-Za-z ]+)\. Airtel Money bal is ZMW (?P<balance>\d+\.\d{2})\. TID : (?P<tid>[A-Z0-9.]+)\.\s*$";

const FAILED_PATTERN: &str = r"^FAILED\.TID: (?P<tid>[A-Z0-9.]+), Dear Customer, you have insufficient funds to complete this transaction";

/// Errors raised while building a template
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Invalid template pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Template '{template}' is missing capture group '{group}'")]
    MissingGroup { template: String, group: &'static str },

    #[error("Template prefix cannot be empty")]
    EmptyPrefix,
}

/// Outcome tag of a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

/// Structured result of a recognized message body
///
/// Amounts stay decimal strings exactly as they appeared in the SMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionRecord {
    #[serde(rename_all = "camelCase")]
    Success {
        amount: String,
        till_number: String,
        recipient_name: String,
        balance: String,
        transaction_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        transaction_id: String,
        reason: String,
    },
}

impl TransactionRecord {
    pub fn status(&self) -> TransactionStatus {
        match self {
            TransactionRecord::Success { .. } => TransactionStatus::Success,
            TransactionRecord::Failed { .. } => TransactionStatus::Failed,
        }
    }

    pub fn transaction_id(&self) -> &str {
        match self {
            TransactionRecord::Success { transaction_id, .. } => transaction_id,
            TransactionRecord::Failed { transaction_id, .. } => transaction_id,
        }
    }

    /// Serialize the record to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a record from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// How a template turns captures into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    /// Needs groups `amount`, `till`, `name`, `balance`, `tid`
    Success,
    /// Needs group `tid`; every record carries the fixed `reason`
    Failure { reason: String },
}

impl Extractor {
    fn required_groups(&self) -> &'static [&'static str] {
        match self {
            Extractor::Success => &["amount", "till", "name", "balance", "tid"],
            Extractor::Failure { .. } => &["tid"],
        }
    }

    fn extract(&self, caps: &Captures<'_>) -> Option<TransactionRecord> {
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        match self {
            Extractor::Success => Some(TransactionRecord::Success {
                amount: group("amount")?,
                till_number: group("till")?,
                recipient_name: group("name")?,
                balance: group("balance")?,
                transaction_id: group("tid")?,
            }),
            Extractor::Failure { reason } => Some(TransactionRecord::Failed {
                transaction_id: group("tid")?,
                reason: reason.clone(),
            }),
        }
    }
}

/// A single recognized notification format
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    name: String,
    prefix: String,
    pattern: Regex,
    extractor: Extractor,
}

impl MessageTemplate {
    /// Compile a template, checking the pattern provides every group the
    /// extractor reads
    pub fn new(
        name: impl Into<String>,
        prefix: impl Into<String>,
        pattern: &str,
        extractor: Extractor,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(TemplateError::EmptyPrefix);
        }

        let pattern = Regex::new(pattern)?;
        for &group in extractor.required_groups() {
            if !pattern.capture_names().flatten().any(|n| n == group) {
                return Err(TemplateError::MissingGroup { template: name, group });
            }
        }

        Ok(Self {
            name,
            prefix,
            pattern,
            extractor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn applies_to(&self, body: &str) -> bool {
        body.starts_with(&self.prefix)
    }

    /// Run the full-body pattern; `None` if the body does not conform
    pub fn parse(&self, body: &str) -> Option<TransactionRecord> {
        let caps = self.pattern.captures(body)?;
        self.extractor.extract(&caps)
    }
}

static AIRTEL_ZAMBIA: LazyLock<Vec<MessageTemplate>> = LazyLock::new(|| {
    vec![
        MessageTemplate::new("airtel-payment", PAYMENT_PREFIX, PAYMENT_PATTERN, Extractor::Success)
            .expect("built-in payment template compiles"),
        MessageTemplate::new(
            "airtel-insufficient-funds",
            FAILED_PREFIX,
            FAILED_PATTERN,
            Extractor::Failure {
                reason: INSUFFICIENT_FUNDS_REASON.to_string(),
            },
        )
        .expect("built-in failure template compiles"),
    ]
});

/// Ordered set of templates consulted by prefix
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<MessageTemplate>,
}

impl TemplateRegistry {
    /// Registry with no templates; every body is unrecognized
    pub fn empty() -> Self {
        Self { templates: Vec::new() }
    }

    /// Registry holding the Airtel Money (Zambia) formats
    pub fn builtin() -> Self {
        Self {
            templates: AIRTEL_ZAMBIA.clone(),
        }
    }

    /// Add a template after the existing ones
    pub fn register(&mut self, template: MessageTemplate) -> &mut Self {
        self.templates.push(template);
        self
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The template whose prefix the body starts with, if any
    pub fn template_for(&self, body: &str) -> Option<&MessageTemplate> {
        self.templates.iter().find(|t| t.applies_to(body))
    }

    /// Parse a body into a record
    ///
    /// # Arguments
    /// * `body` - Raw SMS text from a trusted sender
    ///
    /// # Returns
    /// `Some(TransactionRecord)` if the body fully matches its template, `None` otherwise
    pub fn parse(&self, body: &str) -> Option<TransactionRecord> {
        let Some(template) = self.template_for(body) else {
            debug!("No template for message body, dropping");
            return None;
        };

        let record = template.parse(body);
        if record.is_none() {
            debug!("Body matched prefix of '{}' but not its template", template.name());
        }
        record
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Parse a body with the built-in templates
pub fn parse_message(body: &str) -> Option<TransactionRecord> {
    AIRTEL_ZAMBIA
        .iter()
        .find(|t| t.applies_to(body))
        .and_then(|t| t.parse(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYMENT_BODY: &str = "Payment of ZMW 50.00 Till Number 12345 John Banda. Airtel Money bal is ZMW 150.00. TID : ABC123.DEF.";
    const FAILED_BODY: &str = "FAILED.TID: XYZ999, Dear Customer, you have insufficient funds to complete this transaction. Please top up.";

    fn success(amount: &str, till: &str, name: &str, balance: &str, tid: &str) -> TransactionRecord {
        TransactionRecord::Success {
            amount: amount.to_string(),
            till_number: till.to_string(),
            recipient_name: name.to_string(),
            balance: balance.to_string(),
            transaction_id: tid.to_string(),
        }
    }

    // ==================== success template tests ====================

    #[test]
    fn test_parse_payment_extracts_all_fields() {
        let record = parse_message(PAYMENT_BODY).unwrap();
        assert_eq!(record, success("50.00", "12345", "John Banda", "150.00", "ABC123.DEF"));
        assert_eq!(record.status(), TransactionStatus::Success);
    }

    #[test]
    fn test_parse_payment_with_large_amounts() {
        let body = "Payment of ZMW 12500.75 Till Number 900100 Mwila Grocery Store. Airtel Money bal is ZMW 3.10. TID : PP240101.1234.A.";
        let record = parse_message(body).unwrap();
        assert_eq!(record, success("12500.75", "900100", "Mwila Grocery Store", "3.10", "PP240101.1234.A"));
    }

    #[test]
    fn test_parse_payment_tolerates_trailing_whitespace() {
        let body = format!("{PAYMENT_BODY}  \n");
        assert!(parse_message(&body).is_some());
    }

    #[test]
    fn test_parse_payment_keeps_name_capture_verbatim() {
        let body = "Payment of ZMW 50.00 Till Number 12345  John Banda . Airtel Money bal is ZMW 150.00. TID : ABC1.";
        let record = parse_message(body).unwrap();
        assert_eq!(record, success("50.00", "12345", " John Banda ", "150.00", "ABC1"));
    }

    #[test]
    fn test_parse_payment_rejects_single_decimal_amount() {
        let body = "Payment of ZMW 50.0 Till Number 12345 John Banda. Airtel Money bal is ZMW 150.00. TID : ABC123.";
        assert_eq!(parse_message(body), None);
    }

    #[test]
    fn test_parse_payment_rejects_lowercase_tid() {
        let body = "Payment of ZMW 50.00 Till Number 12345 John Banda. Airtel Money bal is ZMW 150.00. TID : abc123.";
        assert_eq!(parse_message(body), None);
    }

    #[test]
    fn test_parse_payment_rejects_truncated_body() {
        let body = "Payment of ZMW 50.00 Till Number 12345 John Banda.";
        assert_eq!(parse_message(body), None);
    }

    #[test]
    fn test_parse_payment_rejects_trailing_text() {
        let body = format!("{PAYMENT_BODY} Thank you for using Airtel Money.");
        assert_eq!(parse_message(&body), None);
    }

    // ==================== failure template tests ====================

    #[test]
    fn test_parse_failed_extracts_tid_and_reason() {
        let record = parse_message(FAILED_BODY).unwrap();
        assert_eq!(
            record,
            TransactionRecord::Failed {
                transaction_id: "XYZ999".to_string(),
                reason: INSUFFICIENT_FUNDS_REASON.to_string(),
            }
        );
        assert_eq!(record.status(), TransactionStatus::Failed);
    }

    #[test]
    fn test_parse_failed_with_ellipsis_suffix() {
        let body = "FAILED.TID: MP2401.77, Dear Customer, you have insufficient funds to complete this transaction....";
        let record = parse_message(body).unwrap();
        assert_eq!(record.transaction_id(), "MP2401.77");
    }

    #[test]
    fn test_parse_failed_rejects_other_failure_wording() {
        let body = "FAILED.TID: XYZ999, Dear Customer, the service is temporarily unavailable.";
        assert_eq!(parse_message(body), None);
    }

    // ==================== dispatch tests ====================

    #[test]
    fn test_unknown_prefix_yields_none() {
        assert_eq!(parse_message("You have received ZMW 20.00 from 0977000000."), None);
        assert_eq!(parse_message(""), None);
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let body = PAYMENT_BODY.replacen("Payment", "payment", 1);
        assert_eq!(parse_message(&body), None);
    }

    #[test]
    fn test_prefix_must_be_at_start() {
        let body = format!("Notice: {PAYMENT_BODY}");
        assert_eq!(parse_message(&body), None);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = parse_message(PAYMENT_BODY);
        let second = parse_message(PAYMENT_BODY);
        assert_eq!(first, second);
    }

    // ==================== registry tests ====================

    #[test]
    fn test_builtin_registry_matches_parse_message() {
        let registry = TemplateRegistry::builtin();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.parse(PAYMENT_BODY), parse_message(PAYMENT_BODY));
        assert_eq!(registry.parse(FAILED_BODY), parse_message(FAILED_BODY));
    }

    #[test]
    fn test_empty_registry_recognizes_nothing() {
        let registry = TemplateRegistry::empty();
        assert!(registry.is_empty());
        assert_eq!(registry.parse(PAYMENT_BODY), None);
    }

    #[test]
    fn test_template_for_selects_by_prefix() {
        let registry = TemplateRegistry::builtin();
        assert_eq!(registry.template_for(PAYMENT_BODY).unwrap().name(), "airtel-payment");
        assert_eq!(registry.template_for(FAILED_BODY).unwrap().prefix(), FAILED_PREFIX);
        assert!(registry.template_for("Hello").is_none());
    }

    #[test]
    fn test_register_custom_template() {
        let mut registry = TemplateRegistry::builtin();
        let template = MessageTemplate::new(
            "mtn-declined",
            "Declined.",
            r"^Declined\. Ref (?P<tid>[A-Z0-9]+)\.",
            Extractor::Failure {
                reason: "Declined".to_string(),
            },
        )
        .unwrap();
        registry.register(template);

        let record = registry.parse("Declined. Ref QW12. Try again.").unwrap();
        assert_eq!(
            record,
            TransactionRecord::Failed {
                transaction_id: "QW12".to_string(),
                reason: "Declined".to_string(),
            }
        );
    }

    #[test]
    fn test_first_prefix_match_wins_without_fallback() {
        let mut registry = TemplateRegistry::builtin();
        // Would accept a looser payment wording, but the built-in prefix is consulted first
        registry.register(
            MessageTemplate::new("loose", "Payment of", r"^Payment of (?P<tid>[A-Z]+)", Extractor::Failure { reason: "x".into() })
                .unwrap(),
        );
        assert_eq!(registry.parse("Payment of ABC"), None);
    }

    #[test]
    fn test_template_missing_group_rejected() {
        let result = MessageTemplate::new("bad", "Paid", r"^Paid (?P<amount>\d+)", Extractor::Success);
        assert!(matches!(result, Err(TemplateError::MissingGroup { group: "till", .. })));
    }

    #[test]
    fn test_template_invalid_regex_rejected() {
        let result = MessageTemplate::new("bad", "Paid", r"^Paid (?P<tid>[", Extractor::Failure { reason: "x".into() });
        assert!(matches!(result, Err(TemplateError::InvalidPattern(_))));
    }

    #[test]
    fn test_template_empty_prefix_rejected() {
        let result = MessageTemplate::new("bad", "", r"^(?P<tid>\w+)", Extractor::Failure { reason: "x".into() });
        assert!(matches!(result, Err(TemplateError::EmptyPrefix)));
    }

    // ==================== TransactionRecord JSON tests ====================

    #[test]
    fn test_success_record_json_shape() {
        let record = parse_message(PAYMENT_BODY).unwrap();
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        assert_eq!(value["status"], "SUCCESS");
        assert_eq!(value["amount"], "50.00");
        assert_eq!(value["tillNumber"], "12345");
        assert_eq!(value["recipientName"], "John Banda");
        assert_eq!(value["balance"], "150.00");
        assert_eq!(value["transactionId"], "ABC123.DEF");
    }

    #[test]
    fn test_failed_record_json_shape() {
        let record = parse_message(FAILED_BODY).unwrap();
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["transactionId"], "XYZ999");
        assert_eq!(value["reason"], "Insufficient funds");
        assert!(value.get("amount").is_none());
    }

    #[test]
    fn test_record_from_json() {
        let json = r#"{"status":"FAILED","transactionId":"T1","reason":"Insufficient funds"}"#;
        let record = TransactionRecord::from_json(json).unwrap();
        assert_eq!(record.transaction_id(), "T1");
        assert_eq!(record.status().as_str(), "FAILED");
    }
}
