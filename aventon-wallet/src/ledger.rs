use aventon_core::{Cents, EngineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Balance-affecting operation kinds.
///
/// Sign convention for `amount_cents`: HOLD, REFUND and TRANSFER_IN are
/// positive; CAPTURE, RELEASE and WITHDRAW are negative. HOLD/RELEASE move
/// only `hold_cents`, CAPTURE moves both columns, the rest move only
/// `balance_cents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Hold,
    Capture,
    Release,
    Refund,
    Withdraw,
    TransferIn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub operation_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount_cents: Cents,
    pub currency: String,
    pub related_reservation: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Append-only record of every accepted wallet operation. Entries are never
/// updated or removed; corrections happen by appending compensating entries.
#[derive(Debug, Default)]
pub struct LedgerStore {
    entries: Vec<LedgerEntry>,
    by_operation: HashMap<String, usize>,
    by_user: HashMap<String, Vec<usize>>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, enforcing global `operation_id` uniqueness (the
    /// idempotency primitive) and rejecting zero amounts.
    pub fn append(&mut self, entry: LedgerEntry) -> Result<&LedgerEntry, EngineError> {
        if entry.amount_cents == 0 {
            return Err(EngineError::InvalidAmount(0));
        }
        if self.by_operation.contains_key(&entry.operation_id) {
            return Err(EngineError::DuplicateOperation(entry.operation_id));
        }

        let idx = self.entries.len();
        self.by_operation.insert(entry.operation_id.clone(), idx);
        self.by_user
            .entry(entry.user_id.clone())
            .or_default()
            .push(idx);
        self.entries.push(entry);
        Ok(&self.entries[idx])
    }

    pub fn contains_operation(&self, operation_id: &str) -> bool {
        self.by_operation.contains_key(operation_id)
    }

    /// Entries for one user, newest first.
    pub fn entries_for_user(&self, user_id: &str, limit: usize) -> Vec<LedgerEntry> {
        match self.by_user.get(user_id) {
            Some(indices) => indices
                .iter()
                .rev()
                .take(limit)
                .map(|&i| self.entries[i].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn entries_for_reservation(&self, reservation_id: Uuid) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.related_reservation == Some(reservation_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a user's entries back into `(balance_cents, hold_cents)`.
    /// The account aggregator must always agree with this reconstruction.
    pub fn replay(&self, user_id: &str) -> (Cents, Cents) {
        let mut balance: Cents = 0;
        let mut hold: Cents = 0;
        if let Some(indices) = self.by_user.get(user_id) {
            for &i in indices {
                let e = &self.entries[i];
                match e.entry_type {
                    EntryType::Hold | EntryType::Release => hold += e.amount_cents,
                    EntryType::Capture => {
                        balance += e.amount_cents;
                        hold += e.amount_cents;
                    }
                    EntryType::Refund | EntryType::TransferIn | EntryType::Withdraw => {
                        balance += e.amount_cents
                    }
                }
            }
        }
        (balance, hold)
    }
}
