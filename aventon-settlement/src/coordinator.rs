use crate::events::SettlementEvent;
use aventon_booking::{Reservation, ReservationStatus, Route, RouteBook};
use aventon_core::{code, money, Cents, EngineError};
use aventon_wallet::{
    Account, AccountBook, Admission, EntryType, HoldRecord, HoldRegistry, IdempotencyGuard,
    LedgerEntry, LedgerStore,
};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub operation_id: String,
    pub user_id: String,
    pub amount_cents: Cents,
    /// Accepted for wire compatibility with existing clients. Accounts are
    /// single-currency; the ledger entry always carries the account's own
    /// currency, which is what the receipt reports back.
    pub currency: Option<String>,
    pub reservation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub operation_id: String,
    pub user_id: String,
    pub hold_operation_id: String,
    pub reason: Option<String>,
    pub reservation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub operation_id: String,
    pub user_id: String,
    pub amount_cents: Cents,
    pub reservation_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub operation_id: String,
    pub user_id: String,
    pub amount_cents: Cents,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub route_id: Uuid,
    pub passenger_id: String,
    pub seats: i32,
    /// Total fare; priced from the route when absent.
    pub price_cents: Option<Cents>,
    /// Client-supplied id for the backing HOLD; retried creations with the
    /// same id replay instead of booking twice.
    pub hold_operation_id: Option<String>,
}

/// The complete-trip body carries no code; the driver verified it in
/// person. The engine cross-checks the parties and amount instead.
#[derive(Debug, Deserialize)]
pub struct CompleteTripCheck {
    pub reservation_id: Uuid,
    pub passenger_id: String,
    pub driver_id: String,
    pub amount_cents: Cents,
}

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub driver_id: String,
    pub origin: String,
    pub destination: String,
    pub price_cents: Cents,
    pub seats: i32,
    pub pickup_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRouteRequest {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub price_cents: Option<Cents>,
    pub available_seats: Option<i32>,
    pub pickup_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Receipts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletReceipt {
    pub entry: LedgerEntry,
    pub account: Account,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationReceipt {
    pub reservation: Reservation,
    pub hold: WalletReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub reservation: Reservation,
    pub passenger_account: Account,
    pub driver_account: Account,
    pub captured_cents: Cents,
    pub capture_entry: LedgerEntry,
    pub credit_entry: LedgerEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelReceipt {
    pub reservation: Reservation,
    pub account: Account,
    pub released_cents: Cents,
    pub entry: Option<LedgerEntry>,
}

// ============================================================================
// Engine state & coordinator
// ============================================================================

/// Everything a settlement touches: ledger, accounts, holds, reservations,
/// routes and the idempotency records.
struct EngineState {
    ledger: LedgerStore,
    accounts: AccountBook,
    holds: HoldRegistry,
    reservations: HashMap<Uuid, Reservation>,
    routes: RouteBook,
    idempotency: IdempotencyGuard,
}

/// The single transaction boundary of the engine. Every operation takes the
/// mutex once, validates, then applies all of its effects before anyone
/// else can observe the state — money, seats and reservation status move
/// together or not at all.
pub struct SettlementCoordinator {
    state: Mutex<EngineState>,
    events: broadcast::Sender<SettlementEvent>,
}

fn replay_as<T: DeserializeOwned>(outcome: aventon_wallet::StoredOutcome) -> Result<T, EngineError> {
    serde_json::from_value(outcome.response)
        .map_err(|_| EngineError::NotFound(format!("recorded outcome for {}", outcome.operation_id)))
}

fn build_entry(
    entry_type: EntryType,
    operation_id: &str,
    user_id: &str,
    amount_cents: Cents,
    currency: &str,
    related_reservation: Option<Uuid>,
    metadata: serde_json::Value,
) -> LedgerEntry {
    LedgerEntry {
        id: Uuid::new_v4(),
        operation_id: operation_id.to_string(),
        user_id: user_id.to_string(),
        entry_type,
        amount_cents,
        currency: currency.to_string(),
        related_reservation,
        created_at: Utc::now(),
        metadata,
    }
}

fn capture_op(reservation_id: Uuid) -> String {
    format!("capture:{reservation_id}")
}

fn credit_op(reservation_id: Uuid) -> String {
    format!("credit:{reservation_id}")
}

fn release_op(reservation_id: Uuid) -> String {
    format!("release:{reservation_id}")
}

impl SettlementCoordinator {
    pub fn new(default_currency: &str) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(EngineState {
                ledger: LedgerStore::new(),
                accounts: AccountBook::new(default_currency),
                holds: HoldRegistry::new(),
                reservations: HashMap::new(),
                routes: RouteBook::new(),
                idempotency: IdempotencyGuard::new(),
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.events.subscribe()
    }

    fn emit(&self, entry: &LedgerEntry, reservation_status: Option<&str>) {
        let _ = self.events.send(SettlementEvent {
            entry: entry.clone(),
            reservation_status: reservation_status.map(str::to_string),
            timestamp: Utc::now().timestamp(),
        });
    }

    // ------------------------------------------------------------------
    // Wallet operations
    // ------------------------------------------------------------------

    pub async fn hold(&self, req: HoldRequest) -> Result<WalletReceipt, EngineError> {
        money::require_positive(req.amount_cents)?;
        let mut state = self.state.lock().await;

        if let Admission::AlreadyProcessed(outcome) = state.idempotency.admit(&req.operation_id) {
            tracing::info!(operation_id = %req.operation_id, "replaying hold");
            return replay_as(outcome);
        }
        if state.ledger.contains_operation(&req.operation_id) {
            return Err(EngineError::DuplicateOperation(req.operation_id));
        }
        // One active hold per reservation, exactly the fare. A fresh
        // operation_id does not get around that.
        if let Some(rid) = req.reservation_id {
            if let Some(existing) = state.holds.active_for_reservation(rid).first() {
                return Err(EngineError::DuplicateOperation(existing.operation_id.clone()));
            }
        }

        state.accounts.get_or_create(&req.user_id);
        let account = state.accounts.apply_delta(&req.user_id, 0, req.amount_cents)?;
        let entry = build_entry(
            EntryType::Hold,
            &req.operation_id,
            &req.user_id,
            req.amount_cents,
            &account.currency,
            req.reservation_id,
            serde_json::Value::Null,
        );
        let entry = state.ledger.append(entry)?.clone();
        state
            .holds
            .open(&req.operation_id, &req.user_id, req.amount_cents, req.reservation_id)?;

        let receipt = WalletReceipt { entry, account };
        let value = serde_json::to_value(&receipt).unwrap_or_default();
        state.idempotency.record(&req.operation_id, value);
        drop(state);

        tracing::info!(user_id = %receipt.account.user_id, amount = receipt.entry.amount_cents, "hold placed");
        self.emit(&receipt.entry, None);
        Ok(receipt)
    }

    /// Release the full remainder of a hold back to its owner.
    pub async fn release(&self, req: ReleaseRequest) -> Result<WalletReceipt, EngineError> {
        let mut state = self.state.lock().await;

        if let Admission::AlreadyProcessed(outcome) = state.idempotency.admit(&req.operation_id) {
            tracing::info!(operation_id = %req.operation_id, "replaying release");
            return replay_as(outcome);
        }
        if state.ledger.contains_operation(&req.operation_id) {
            return Err(EngineError::DuplicateOperation(req.operation_id));
        }

        let hold = state
            .holds
            .get(&req.hold_operation_id)
            .filter(|h| h.user_id == req.user_id)
            .ok_or_else(|| EngineError::NotFound(format!("hold {}", req.hold_operation_id)))?;
        let remaining = hold.remaining();
        if remaining <= 0 {
            return Err(EngineError::InsufficientHold { held: 0, requested: hold.amount_cents });
        }
        let related = hold.reservation_id.or(req.reservation_id);

        state.holds.release(&req.hold_operation_id, remaining)?;
        let account = state.accounts.apply_delta(&req.user_id, 0, -remaining)?;
        let entry = build_entry(
            EntryType::Release,
            &req.operation_id,
            &req.user_id,
            -remaining,
            &account.currency,
            related,
            serde_json::json!({
                "hold_operation_id": req.hold_operation_id,
                "reason": req.reason,
            }),
        );
        let entry = state.ledger.append(entry)?.clone();

        let receipt = WalletReceipt { entry, account };
        let value = serde_json::to_value(&receipt).unwrap_or_default();
        state.idempotency.record(&req.operation_id, value);
        drop(state);

        tracing::info!(user_id = %receipt.account.user_id, released = remaining, "hold released");
        self.emit(&receipt.entry, None);
        Ok(receipt)
    }

    /// Credit a user's balance. Top-ups come through here with
    /// `reason = "topup"`; so do compensating refunds after a bad capture.
    pub async fn refund(&self, req: RefundRequest) -> Result<WalletReceipt, EngineError> {
        money::require_positive(req.amount_cents)?;
        let mut state = self.state.lock().await;

        if let Admission::AlreadyProcessed(outcome) = state.idempotency.admit(&req.operation_id) {
            tracing::info!(operation_id = %req.operation_id, "replaying refund");
            return replay_as(outcome);
        }
        if state.ledger.contains_operation(&req.operation_id) {
            return Err(EngineError::DuplicateOperation(req.operation_id));
        }

        state.accounts.get_or_create(&req.user_id);
        let account = state.accounts.apply_delta(&req.user_id, req.amount_cents, 0)?;
        let entry = build_entry(
            EntryType::Refund,
            &req.operation_id,
            &req.user_id,
            req.amount_cents,
            &account.currency,
            req.reservation_id,
            serde_json::json!({ "reason": req.reason }),
        );
        let entry = state.ledger.append(entry)?.clone();

        let receipt = WalletReceipt { entry, account };
        let value = serde_json::to_value(&receipt).unwrap_or_default();
        state.idempotency.record(&req.operation_id, value);
        drop(state);

        self.emit(&receipt.entry, None);
        Ok(receipt)
    }

    /// Debit available (not held) balance.
    pub async fn withdraw(&self, req: WithdrawRequest) -> Result<WalletReceipt, EngineError> {
        money::require_positive(req.amount_cents)?;
        let mut state = self.state.lock().await;

        if let Admission::AlreadyProcessed(outcome) = state.idempotency.admit(&req.operation_id) {
            tracing::info!(operation_id = %req.operation_id, "replaying withdraw");
            return replay_as(outcome);
        }
        if state.ledger.contains_operation(&req.operation_id) {
            return Err(EngineError::DuplicateOperation(req.operation_id));
        }

        let before = state.accounts.get_or_create(&req.user_id);
        if before.available() < req.amount_cents {
            return Err(EngineError::InsufficientFunds {
                available: before.available(),
                requested: req.amount_cents,
            });
        }
        let account = state.accounts.apply_delta(&req.user_id, -req.amount_cents, 0)?;
        let entry = build_entry(
            EntryType::Withdraw,
            &req.operation_id,
            &req.user_id,
            -req.amount_cents,
            &account.currency,
            None,
            serde_json::json!({ "reason": req.reason }),
        );
        let entry = state.ledger.append(entry)?.clone();

        let receipt = WalletReceipt { entry, account };
        let value = serde_json::to_value(&receipt).unwrap_or_default();
        state.idempotency.record(&req.operation_id, value);
        drop(state);

        tracing::info!(user_id = %receipt.account.user_id, amount = req.amount_cents, "withdrawal");
        self.emit(&receipt.entry, None);
        Ok(receipt)
    }

    pub async fn get_account(&self, user_id: &str) -> Account {
        let mut state = self.state.lock().await;
        state.accounts.get_or_create(user_id)
    }

    pub async fn ledger_for_user(&self, user_id: &str, limit: usize) -> Vec<LedgerEntry> {
        let state = self.state.lock().await;
        state.ledger.entries_for_user(user_id, limit)
    }

    pub async fn holds_for_reservation(&self, reservation_id: Uuid) -> Vec<HoldRecord> {
        let state = self.state.lock().await;
        state
            .holds
            .active_for_reservation(reservation_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Ledger/aggregator consistency check, used by tests and the sweeper's
    /// sanity logging.
    pub async fn reconcile(&self, user_id: &str) -> Option<(Cents, Cents, Account)> {
        let state = self.state.lock().await;
        let account = state.accounts.get(user_id)?.clone();
        let (balance, hold) = state.ledger.replay(user_id);
        Some((balance, hold, account))
    }

    // ------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------

    pub async fn create_route(&self, req: CreateRouteRequest) -> Result<Route, EngineError> {
        money::require_positive(req.price_cents)?;
        if req.seats < 1 {
            return Err(EngineError::InvalidAmount(req.seats as i64));
        }
        let mut state = self.state.lock().await;
        let route = Route {
            id: Uuid::new_v4(),
            driver_id: req.driver_id,
            origin: req.origin,
            destination: req.destination,
            price_cents: req.price_cents,
            total_seats: req.seats,
            available_seats: req.seats,
            pickup_at: req.pickup_at,
            created_at: Utc::now(),
        };
        Ok(state.routes.insert(route).clone())
    }

    pub async fn get_route(&self, route_id: Uuid) -> Result<Route, EngineError> {
        let state = self.state.lock().await;
        state.routes.get(route_id).cloned()
    }

    /// Partial route update. The whole request is validated before any
    /// field is written, so a rejected update leaves the route untouched.
    pub async fn update_route(&self, route_id: Uuid, req: UpdateRouteRequest) -> Result<Route, EngineError> {
        if let Some(price) = req.price_cents {
            money::require_positive(price)?;
        }
        if let Some(seats) = req.available_seats {
            if seats < 0 {
                return Err(EngineError::OversoldSeats { requested: seats, available: 0 });
            }
        }

        let mut state = self.state.lock().await;
        if let Some(seats) = req.available_seats {
            state.routes.set_available_seats(route_id, seats)?;
        }
        let route = state.routes.get_mut(route_id)?;
        if let Some(origin) = req.origin {
            route.origin = origin;
        }
        if let Some(destination) = req.destination {
            route.destination = destination;
        }
        if let Some(price) = req.price_cents {
            route.price_cents = price;
        }
        if let Some(pickup_at) = req.pickup_at {
            route.pickup_at = pickup_at;
        }
        Ok(route.clone())
    }

    // ------------------------------------------------------------------
    // Reservations
    // ------------------------------------------------------------------

    /// All-or-nothing creation: seat decrement first, then the HOLD. A
    /// failed hold rolls the seats back and nothing was booked.
    pub async fn create_reservation(
        &self,
        req: CreateReservationRequest,
    ) -> Result<ReservationReceipt, EngineError> {
        if req.seats < 1 {
            return Err(EngineError::InvalidAmount(req.seats as i64));
        }
        let mut state = self.state.lock().await;

        let route = state.routes.get(req.route_id)?.clone();
        let price = match req.price_cents {
            Some(p) => money::require_positive(p)?,
            None => (route.price_cents)
                .checked_mul(req.seats as i64)
                .ok_or(EngineError::AmountOverflow)?,
        };

        let mut reservation = Reservation::new(
            req.route_id,
            &route.driver_id,
            &req.passenger_id,
            req.seats,
            price,
            "",
            route.pickup_at,
        );
        let hold_op = req
            .hold_operation_id
            .unwrap_or_else(|| format!("hold:{}", reservation.id));
        reservation.hold_operation_id = hold_op.clone();

        if let Admission::AlreadyProcessed(outcome) = state.idempotency.admit(&hold_op) {
            tracing::info!(operation_id = %hold_op, "replaying reservation creation");
            return replay_as(outcome);
        }
        if state.ledger.contains_operation(&hold_op) || state.holds.get(&hold_op).is_some() {
            return Err(EngineError::DuplicateOperation(hold_op));
        }

        state.routes.reserve_seats(req.route_id, req.seats)?;

        state.accounts.get_or_create(&req.passenger_id);
        let account = match state.accounts.apply_delta(&req.passenger_id, 0, price) {
            Ok(account) => account,
            Err(err) => {
                // Compensate the seat decrement, in reverse order.
                state.routes.restore_seats(req.route_id, req.seats)?;
                return Err(err);
            }
        };

        let entry = build_entry(
            EntryType::Hold,
            &hold_op,
            &req.passenger_id,
            price,
            &account.currency,
            Some(reservation.id),
            serde_json::json!({ "seats": req.seats }),
        );
        let entry = state.ledger.append(entry)?.clone();
        state
            .holds
            .open(&hold_op, &req.passenger_id, price, Some(reservation.id))?;
        state.reservations.insert(reservation.id, reservation.clone());

        let receipt = ReservationReceipt {
            reservation,
            hold: WalletReceipt { entry, account },
        };
        let value = serde_json::to_value(&receipt).unwrap_or_default();
        state.idempotency.record(&hold_op, value);
        drop(state);

        tracing::info!(
            reservation_id = %receipt.reservation.id,
            passenger_id = %receipt.reservation.passenger_id,
            seats = receipt.reservation.seats,
            "reservation created"
        );
        self.emit(&receipt.hold.entry, Some("PENDING"));
        Ok(receipt)
    }

    pub async fn get_reservation(&self, reservation_id: Uuid) -> Result<Reservation, EngineError> {
        let state = self.state.lock().await;
        state
            .reservations
            .get(&reservation_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))
    }

    /// Reservations the given user participates in, newest first.
    pub async fn list_reservations(&self, party: &str) -> Vec<Reservation> {
        let state = self.state.lock().await;
        let mut out: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.passenger_id == party || r.driver_id == party)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// PENDING -> CONFIRMED. Plain status move, no money or seats.
    pub async fn confirm_reservation(&self, reservation_id: Uuid) -> Result<Reservation, EngineError> {
        let mut state = self.state.lock().await;
        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))?;
        reservation.transition(ReservationStatus::Confirmed)?;
        Ok(reservation.clone())
    }

    /// Canonical completion: the passenger's code must match exactly.
    pub async fn complete_reservation(
        &self,
        reservation_id: Uuid,
        submitted_code: &str,
    ) -> Result<SettlementReceipt, EngineError> {
        let mut state = self.state.lock().await;
        if let Admission::AlreadyProcessed(outcome) =
            state.idempotency.admit(&capture_op(reservation_id))
        {
            tracing::info!(%reservation_id, "replaying completion");
            return replay_as(outcome);
        }

        let reservation = state
            .reservations
            .get(&reservation_id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))?;
        if reservation.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(reservation.status.as_str().to_string()));
        }
        // Shape check first; a string that cannot be a code can never match.
        if !code::is_well_formed(submitted_code) {
            return Err(EngineError::WrongCode);
        }
        reservation.check_code(submitted_code)?;

        let receipt = Self::settle_completion(&mut state, reservation_id)?;
        drop(state);
        self.publish_completion(&receipt);
        Ok(receipt)
    }

    /// Wire-compat completion for `/api/wallet/complete-trip`: validated by
    /// party and amount instead of code, settled identically.
    pub async fn complete_trip(&self, check: CompleteTripCheck) -> Result<SettlementReceipt, EngineError> {
        let mut state = self.state.lock().await;
        if let Admission::AlreadyProcessed(outcome) =
            state.idempotency.admit(&capture_op(check.reservation_id))
        {
            tracing::info!(reservation_id = %check.reservation_id, "replaying completion");
            return replay_as(outcome);
        }

        let reservation = state
            .reservations
            .get(&check.reservation_id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {}", check.reservation_id)))?;
        if reservation.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(reservation.status.as_str().to_string()));
        }
        if reservation.passenger_id != check.passenger_id || reservation.driver_id != check.driver_id {
            return Err(EngineError::NotFound(format!(
                "reservation {} for those parties",
                check.reservation_id
            )));
        }
        if reservation.price_cents != check.amount_cents {
            return Err(EngineError::InvalidAmount(check.amount_cents));
        }

        let receipt = Self::settle_completion(&mut state, check.reservation_id)?;
        drop(state);
        self.publish_completion(&receipt);
        Ok(receipt)
    }

    /// CAPTURE the full hold, credit the driver, mark COMPLETED — one unit.
    /// Deterministic operation ids make a retried completion a replay, so a
    /// second CAPTURE can never happen.
    fn settle_completion(
        state: &mut EngineState,
        reservation_id: Uuid,
    ) -> Result<SettlementReceipt, EngineError> {
        let (hold_op, passenger_id, driver_id) = {
            let r = state
                .reservations
                .get(&reservation_id)
                .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))?;
            (r.hold_operation_id.clone(), r.passenger_id.clone(), r.driver_id.clone())
        };

        let amount = state
            .holds
            .get(&hold_op)
            .map(HoldRecord::remaining)
            .unwrap_or(0);
        if amount <= 0 {
            return Err(EngineError::InsufficientHold { held: 0, requested: 0 });
        }

        state.holds.capture(&hold_op, amount)?;
        let passenger_account = state.accounts.apply_delta(&passenger_id, -amount, -amount)?;
        let capture_entry = build_entry(
            EntryType::Capture,
            &capture_op(reservation_id),
            &passenger_id,
            -amount,
            &passenger_account.currency,
            Some(reservation_id),
            serde_json::json!({ "hold_operation_id": hold_op }),
        );
        let capture_entry = state.ledger.append(capture_entry)?.clone();

        state.accounts.get_or_create(&driver_id);
        let driver_account = state.accounts.apply_delta(&driver_id, amount, 0)?;
        let credit_entry = build_entry(
            EntryType::TransferIn,
            &credit_op(reservation_id),
            &driver_id,
            amount,
            &driver_account.currency,
            Some(reservation_id),
            serde_json::json!({ "capture_operation_id": capture_op(reservation_id) }),
        );
        let credit_entry = state.ledger.append(credit_entry)?.clone();

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))?;
        if reservation.status == ReservationStatus::Pending {
            reservation.transition(ReservationStatus::Confirmed)?;
        }
        reservation.transition(ReservationStatus::Completed)?;
        let reservation = reservation.clone();

        let receipt = SettlementReceipt {
            reservation,
            passenger_account,
            driver_account,
            captured_cents: amount,
            capture_entry,
            credit_entry,
        };
        let value = serde_json::to_value(&receipt).unwrap_or_default();
        state.idempotency.record(&capture_op(reservation_id), value);
        Ok(receipt)
    }

    fn publish_completion(&self, receipt: &SettlementReceipt) {
        tracing::info!(
            reservation_id = %receipt.reservation.id,
            captured = receipt.captured_cents,
            driver_id = %receipt.reservation.driver_id,
            "trip completed"
        );
        // The ledger wrote two entries; surface both on the feed.
        self.emit(&receipt.capture_entry, Some("COMPLETED"));
        self.emit(&receipt.credit_entry, Some("COMPLETED"));
    }

    /// RELEASE the hold, restore seats, mark CANCELLED — one unit.
    pub async fn cancel_reservation(&self, reservation_id: Uuid) -> Result<CancelReceipt, EngineError> {
        let mut state = self.state.lock().await;
        if let Admission::AlreadyProcessed(outcome) =
            state.idempotency.admit(&release_op(reservation_id))
        {
            tracing::info!(%reservation_id, "replaying cancellation");
            return replay_as(outcome);
        }

        let receipt = Self::settle_cancellation(&mut state, reservation_id, "cancelled")?;
        drop(state);

        tracing::info!(%reservation_id, released = receipt.released_cents, "reservation cancelled");
        if let Some(entry) = &receipt.entry {
            self.emit(entry, Some("CANCELLED"));
        }
        Ok(receipt)
    }

    fn settle_cancellation(
        state: &mut EngineState,
        reservation_id: Uuid,
        reason: &str,
    ) -> Result<CancelReceipt, EngineError> {
        let (hold_op, passenger_id, route_id, seats, status) = {
            let r = state
                .reservations
                .get(&reservation_id)
                .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))?;
            (r.hold_operation_id.clone(), r.passenger_id.clone(), r.route_id, r.seats, r.status)
        };
        if status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(status.as_str().to_string()));
        }

        let remaining = state
            .holds
            .get(&hold_op)
            .map(HoldRecord::remaining)
            .unwrap_or(0);

        let mut entry = None;
        if remaining > 0 {
            state.holds.release(&hold_op, remaining)?;
            let account = state.accounts.apply_delta(&passenger_id, 0, -remaining)?;
            let release_entry = build_entry(
                EntryType::Release,
                &release_op(reservation_id),
                &passenger_id,
                -remaining,
                &account.currency,
                Some(reservation_id),
                serde_json::json!({ "hold_operation_id": hold_op, "reason": reason }),
            );
            entry = Some(state.ledger.append(release_entry)?.clone());
        }

        state.routes.restore_seats(route_id, seats)?;

        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))?;
        reservation.transition(ReservationStatus::Cancelled)?;
        let reservation = reservation.clone();

        let account = state
            .accounts
            .get(&passenger_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("account {passenger_id}")))?;
        let receipt = CancelReceipt {
            reservation,
            account,
            released_cents: remaining,
            entry,
        };
        let value = serde_json::to_value(&receipt).unwrap_or_default();
        state.idempotency.record(&release_op(reservation_id), value);
        Ok(receipt)
    }

    // ------------------------------------------------------------------
    // Maintenance (driven by the background sweeper)
    // ------------------------------------------------------------------

    /// Cancel PENDING reservations whose pickup time plus grace has passed,
    /// releasing funds and seats through the normal cancellation path.
    pub async fn expire_stale(&self, grace_seconds: i64) -> Vec<Uuid> {
        let mut state = self.state.lock().await;
        let cutoff = Utc::now() - Duration::seconds(grace_seconds);
        let stale: Vec<Uuid> = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.pickup_at < cutoff)
            .map(|r| r.id)
            .collect();

        let mut expired = Vec::new();
        let mut receipts = Vec::new();
        for id in stale {
            match Self::settle_cancellation(&mut state, id, "expired") {
                Ok(receipt) => {
                    tracing::info!(reservation_id = %id, released = receipt.released_cents, "reservation expired");
                    expired.push(id);
                    receipts.push(receipt);
                }
                Err(err) => {
                    tracing::error!(reservation_id = %id, error = %err, "expiry failed");
                }
            }
        }
        drop(state);

        // The archive consumes the feed; expiry releases must reach it the
        // same way client-driven cancellations do.
        for receipt in &receipts {
            if let Some(entry) = &receipt.entry {
                self.emit(entry, Some("CANCELLED"));
            }
        }
        expired
    }

    /// Drop idempotency records older than the retention window.
    pub async fn prune_idempotency(&self, retention_days: i64) -> usize {
        let mut state = self.state.lock().await;
        state
            .idempotency
            .prune_older_than(Utc::now() - Duration::days(retention_days))
    }
}
