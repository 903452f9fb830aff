//! Trusted Sender Filtering
//!
//! Decides whether an incoming SMS is eligible for parsing and persistence.
//! A message passes when its sender matches the trusted-sender allow-list and,
//! with keyword filtering enabled, its body looks like a transaction notice
//! and carries none of the excluded account-security phrases.

use std::sync::Arc;

use parking_lot::RwLock;

/// Senders trusted before any runtime update
pub const DEFAULT_TRUSTED_SENDERS: &[&str] = &["AirtelMoney", "+260971911215"];

/// Body must contain at least one of these (case-insensitive)
pub const TRANSACTION_KEYWORDS: &[&str] = &[
    "sent",
    "received",
    "balance",
    "withdrawn",
    "payment",
    "transaction",
    "failed",
    "successful",
    "TID",
    "Till Number",
    "deposit",
    "insufficient funds",
];

/// Body must contain none of these (case-insensitive)
pub const EXCLUDED_KEYWORDS: &[&str] = &[
    "incorrect PIN",
    "forgotten PIN",
    "type your correct",
    "lock your account",
];

/// Which rules a message must satisfy on top of the sender match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Trusted sender is sufficient
    SenderOnly,
    /// Trusted sender, a transaction keyword, and no excluded phrase
    #[default]
    SenderAndKeywords,
}

impl FilterMode {
    pub fn keyword_filtering(&self) -> bool {
        matches!(self, FilterMode::SenderAndKeywords)
    }
}

/// Allow-list of sender substrings, matched case-insensitively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedSenderPolicy {
    patterns: Vec<String>,
    needles: Vec<String>,
}

impl TrustedSenderPolicy {
    /// Build a policy from raw patterns. Blank entries are dropped, since an
    /// empty needle would match every sender.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.into().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let needles = patterns.iter().map(|p| p.to_lowercase()).collect();

        Self { patterns, needles }
    }

    /// Policy that trusts nobody
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// `true` if `sender` contains any trusted pattern, ignoring case
    pub fn matches(&self, sender: &str) -> bool {
        if sender.is_empty() {
            return false;
        }
        let sender = sender.to_lowercase();
        self.needles.iter().any(|needle| sender.contains(needle.as_str()))
    }
}

impl Default for TrustedSenderPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_SENDERS.iter().copied())
    }
}

fn contains_any(body: &str, keywords: &[&str]) -> bool {
    let body = body.to_lowercase();
    keywords
        .iter()
        .any(|keyword| body.contains(&keyword.to_lowercase()))
}

/// Check whether the body mentions any transaction keyword
pub fn contains_transaction_keyword(body: &str) -> bool {
    contains_any(body, TRANSACTION_KEYWORDS)
}

/// Check whether the body mentions any excluded phrase
pub fn contains_excluded_keyword(body: &str) -> bool {
    contains_any(body, EXCLUDED_KEYWORDS)
}

/// Decide whether a message is eligible for parsing
///
/// The service center never grants or blocks trust, so it is not an input.
///
/// # Arguments
/// * `policy` - The trusted-sender allow-list to match against
/// * `mode` - Whether the keyword rules apply
/// * `sender` - Originating address, possibly empty
/// * `body` - Raw message text
///
/// # Returns
/// `true` if the message should go on to the parser, `false` otherwise
pub fn is_eligible(policy: &TrustedSenderPolicy, mode: FilterMode, sender: &str, body: &str) -> bool {
    if !policy.matches(sender) {
        return false;
    }
    if !mode.keyword_filtering() {
        return true;
    }
    contains_transaction_keyword(body) && !contains_excluded_keyword(body)
}

/// Shared, atomically replaceable handle to the current policy
///
/// Readers take a snapshot and evaluate against it, so a concurrent
/// [`PolicyHandle::replace`] is observed either entirely or not at all.
#[derive(Debug, Clone, Default)]
pub struct PolicyHandle {
    current: Arc<RwLock<Arc<TrustedSenderPolicy>>>,
}

impl PolicyHandle {
    pub fn new(policy: TrustedSenderPolicy) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    /// The policy in force right now
    pub fn snapshot(&self) -> Arc<TrustedSenderPolicy> {
        Arc::clone(&*self.current.read())
    }

    /// Swap in a new policy wholesale, returning the previous one
    pub fn replace(&self, policy: TrustedSenderPolicy) -> Arc<TrustedSenderPolicy> {
        let mut guard = self.current.write();
        std::mem::replace(&mut *guard, Arc::new(policy))
    }
}
