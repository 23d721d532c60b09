use aventon_core::{Cents, EngineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One logical hold, keyed by the HOLD entry's `operation_id`. A hold stays
/// active until capture + release consume its full amount; the consumed
/// total can never exceed the original amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldRecord {
    pub operation_id: String,
    pub user_id: String,
    pub amount_cents: Cents,
    pub captured_cents: Cents,
    pub released_cents: Cents,
    pub reservation_id: Option<Uuid>,
    pub opened_at: DateTime<Utc>,
}

impl HoldRecord {
    pub fn remaining(&self) -> Cents {
        self.amount_cents - self.captured_cents - self.released_cents
    }

    pub fn is_active(&self) -> bool {
        self.remaining() > 0
    }
}

#[derive(Debug, Default)]
pub struct HoldRegistry {
    holds: HashMap<String, HoldRecord>,
    by_reservation: HashMap<Uuid, Vec<String>>,
}

impl HoldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(
        &mut self,
        operation_id: &str,
        user_id: &str,
        amount_cents: Cents,
        reservation_id: Option<Uuid>,
    ) -> Result<&HoldRecord, EngineError> {
        if self.holds.contains_key(operation_id) {
            return Err(EngineError::DuplicateOperation(operation_id.to_string()));
        }
        if let Some(rid) = reservation_id {
            self.by_reservation
                .entry(rid)
                .or_default()
                .push(operation_id.to_string());
        }
        let record = HoldRecord {
            operation_id: operation_id.to_string(),
            user_id: user_id.to_string(),
            amount_cents,
            captured_cents: 0,
            released_cents: 0,
            reservation_id,
            opened_at: Utc::now(),
        };
        Ok(self
            .holds
            .entry(operation_id.to_string())
            .or_insert(record))
    }

    pub fn get(&self, operation_id: &str) -> Option<&HoldRecord> {
        self.holds.get(operation_id)
    }

    /// Consume part of a hold by capture. Rejects consuming more than the
    /// hold still covers, which is what makes double-capture impossible.
    pub fn capture(&mut self, operation_id: &str, amount_cents: Cents) -> Result<&HoldRecord, EngineError> {
        let hold = self
            .holds
            .get_mut(operation_id)
            .ok_or_else(|| EngineError::NotFound(format!("hold {operation_id}")))?;
        if amount_cents > hold.remaining() {
            return Err(EngineError::InsufficientHold {
                held: hold.remaining(),
                requested: amount_cents,
            });
        }
        hold.captured_cents += amount_cents;
        Ok(hold)
    }

    /// Consume part of a hold by release (money back to the owner).
    pub fn release(&mut self, operation_id: &str, amount_cents: Cents) -> Result<&HoldRecord, EngineError> {
        let hold = self
            .holds
            .get_mut(operation_id)
            .ok_or_else(|| EngineError::NotFound(format!("hold {operation_id}")))?;
        if amount_cents > hold.remaining() {
            return Err(EngineError::InsufficientHold {
                held: hold.remaining(),
                requested: amount_cents,
            });
        }
        hold.released_cents += amount_cents;
        Ok(hold)
    }

    pub fn active_for_reservation(&self, reservation_id: Uuid) -> Vec<&HoldRecord> {
        match self.by_reservation.get(&reservation_id) {
            Some(ops) => ops
                .iter()
                .filter_map(|op| self.holds.get(op))
                .filter(|h| h.is_active())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn has_active_hold(&self, reservation_id: Uuid) -> bool {
        !self.active_for_reservation(reservation_id).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_plus_release_bounded_by_original() {
        let mut registry = HoldRegistry::new();
        registry.open("h1", "u1", 15_000, None).unwrap();

        registry.capture("h1", 10_000).unwrap();
        registry.release("h1", 5_000).unwrap();

        // Hold fully consumed, nothing more to take either way.
        let err = registry.capture("h1", 1).unwrap_err();
        assert_eq!(err, EngineError::InsufficientHold { held: 0, requested: 1 });
        let err = registry.release("h1", 1).unwrap_err();
        assert_eq!(err, EngineError::InsufficientHold { held: 0, requested: 1 });
    }

    #[test]
    fn test_double_release_rejected() {
        let mut registry = HoldRegistry::new();
        registry.open("h1", "u1", 15_000, None).unwrap();
        registry.release("h1", 15_000).unwrap();
        assert!(registry.release("h1", 15_000).is_err());
    }

    #[test]
    fn test_active_holds_by_reservation() {
        let mut registry = HoldRegistry::new();
        let reservation = Uuid::new_v4();
        registry.open("h1", "u1", 15_000, Some(reservation)).unwrap();
        assert!(registry.has_active_hold(reservation));

        registry.release("h1", 15_000).unwrap();
        assert!(!registry.has_active_hold(reservation));
        assert!(registry.active_for_reservation(reservation).is_empty());
    }

    #[test]
    fn test_duplicate_open_rejected() {
        let mut registry = HoldRegistry::new();
        registry.open("h1", "u1", 1_000, None).unwrap();
        assert!(matches!(
            registry.open("h1", "u1", 1_000, None),
            Err(EngineError::DuplicateOperation(_))
        ));
    }
}
