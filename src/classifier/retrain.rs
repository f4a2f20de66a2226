//! When to refit the classifier
//!
//! Refits are explicit and gated: either every `n` outcomes, or whenever the
//! trailing window's content hash changes. A feature shape mismatch forces
//! the next refit regardless of the rule.

use sha2::{Digest, Sha256};

use crate::config::RetrainConfig;
use crate::models::Outcome;

#[derive(Debug, Clone)]
pub struct RetrainPolicy {
    rule: RetrainConfig,
    /// Fewer outcomes than this cannot produce a single training row
    min_len: usize,
    last_trained_len: Option<usize>,
    last_hash: Option<String>,
    forced: bool,
}

impl RetrainPolicy {
    pub fn new(rule: RetrainConfig, min_len: usize) -> Self {
        Self {
            rule,
            min_len,
            last_trained_len: None,
            last_hash: None,
            forced: false,
        }
    }

    pub fn should_retrain(&self, outcomes: &[Outcome]) -> bool {
        let len = outcomes.len();
        if len < self.min_len {
            return false;
        }
        if self.forced {
            return true;
        }
        match self.rule {
            RetrainConfig::EveryN { n } => {
                n > 0 && len % n == 0 && self.last_trained_len != Some(len)
            }
            RetrainConfig::ContentHash { tail } => {
                self.last_hash.as_deref() != Some(tail_hash(outcomes, tail).as_str())
            }
        }
    }

    /// Record a completed refit over `outcomes`.
    pub fn mark_trained(&mut self, outcomes: &[Outcome]) {
        self.last_trained_len = Some(outcomes.len());
        if let RetrainConfig::ContentHash { tail } = self.rule {
            self.last_hash = Some(tail_hash(outcomes, tail));
        }
        self.forced = false;
    }

    pub fn force(&mut self) {
        self.forced = true;
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    pub fn last_trained_len(&self) -> Option<usize> {
        self.last_trained_len
    }
}

/// Hex SHA-256 over the ids and values of the last `tail` outcomes
pub fn tail_hash(outcomes: &[Outcome], tail: usize) -> String {
    let start = outcomes.len().saturating_sub(tail);
    let mut hasher = Sha256::new();
    for o in &outcomes[start..] {
        hasher.update(o.external_id.as_bytes());
        hasher.update(b":");
        hasher.update(o.value.to_le_bytes());
        hasher.update(b";");
    }
    hex::encode(hasher.finalize())
}
