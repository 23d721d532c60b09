use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of asking the guard about an `operation_id`.
#[derive(Debug, Clone)]
pub enum Admission {
    FirstSeen,
    AlreadyProcessed(StoredOutcome),
}

/// The recorded response for an accepted operation. Replays return this
/// verbatim so a retried request observes exactly what the original did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredOutcome {
    pub operation_id: String,
    pub response: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Deduplicates mutating operations by caller-supplied `operation_id`.
/// Records are kept for the retention window (configured in days, at least
/// the lifetime of a reservation plus margin) and pruned by the sweeper.
#[derive(Debug, Default)]
pub struct IdempotencyGuard {
    seen: HashMap<String, StoredOutcome>,
}

impl IdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, operation_id: &str) -> Admission {
        match self.seen.get(operation_id) {
            Some(outcome) => Admission::AlreadyProcessed(outcome.clone()),
            None => Admission::FirstSeen,
        }
    }

    pub fn record(&mut self, operation_id: &str, response: serde_json::Value) {
        self.seen.insert(
            operation_id.to_string(),
            StoredOutcome {
                operation_id: operation_id.to_string(),
                response,
                recorded_at: Utc::now(),
            },
        );
    }

    /// Drop records older than the cutoff. Returns how many were pruned.
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, outcome| outcome.recorded_at >= cutoff);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_first_seen_then_replayed() {
        let mut guard = IdempotencyGuard::new();
        assert!(matches!(guard.admit("op-1"), Admission::FirstSeen));

        guard.record("op-1", serde_json::json!({"balance_cents": 1000}));
        match guard.admit("op-1") {
            Admission::AlreadyProcessed(outcome) => {
                assert_eq!(outcome.response["balance_cents"], 1000);
            }
            Admission::FirstSeen => panic!("expected replay"),
        }
    }

    #[test]
    fn test_prune_respects_cutoff() {
        let mut guard = IdempotencyGuard::new();
        guard.record("old", serde_json::Value::Null);
        guard.record("new", serde_json::Value::Null);

        // Nothing is older than 30 days yet.
        let pruned = guard.prune_older_than(Utc::now() - Duration::days(30));
        assert_eq!(pruned, 0);
        assert_eq!(guard.len(), 2);

        // Everything is older than a future cutoff.
        let pruned = guard.prune_older_than(Utc::now() + Duration::seconds(1));
        assert_eq!(pruned, 2);
        assert!(guard.is_empty());
    }
}
