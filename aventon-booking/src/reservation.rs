use aventon_core::{code, Cents, EngineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reservation lifecycle:
/// PENDING -> {CONFIRMED, CANCELLED}, CONFIRMED -> {COMPLETED, CANCELLED}.
/// COMPLETED and CANCELLED are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Completed | ReservationStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub route_id: Uuid,
    pub driver_id: String,
    pub passenger_id: String,
    pub seats: i32,
    pub price_cents: Cents,
    pub status: ReservationStatus,
    /// 5-digit confirmation code, present while PENDING/CONFIRMED and
    /// cleared on any terminal transition.
    pub code: Option<String>,
    /// Operation id of the HOLD backing this reservation.
    pub hold_operation_id: String,
    pub pickup_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        route_id: Uuid,
        driver_id: &str,
        passenger_id: &str,
        seats: i32,
        price_cents: Cents,
        hold_operation_id: &str,
        pickup_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            route_id,
            driver_id: driver_id.to_string(),
            passenger_id: passenger_id.to_string(),
            seats,
            price_cents,
            status: ReservationStatus::Pending,
            code: Some(code::generate()),
            hold_operation_id: hold_operation_id.to_string(),
            pickup_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enforce the state machine. Terminal states answer `AlreadyTerminal`
    /// so callers can tell "too late" apart from "never legal".
    pub fn transition(&mut self, next: ReservationStatus) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(self.status.as_str().to_string()));
        }
        if !self.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.code = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Compare a submitted confirmation code. No state change either way.
    pub fn check_code(&self, submitted: &str) -> Result<(), EngineError> {
        match &self.code {
            Some(code) if code == submitted => Ok(()),
            _ => Err(EngineError::WrongCode),
        }
    }
}
