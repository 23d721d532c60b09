use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use aventon_settlement::{
    CompleteTripCheck, HoldRequest, RefundRequest, ReleaseRequest, SettlementReceipt,
    WalletReceipt, WithdrawRequest,
};
use aventon_wallet::{Account, HoldRecord, LedgerEntry};

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/wallet/hold", post(place_hold))
        .route("/api/wallet/release", post(release_hold))
        // Older client builds post to /release-hold; same handler.
        .route("/api/wallet/release-hold", post(release_hold))
        .route("/api/wallet/refund", post(refund))
        .route("/api/wallet/withdraw", post(withdraw))
        .route("/api/wallet/complete-trip", post(complete_trip))
        .route("/api/wallet/accounts/{user_id}", get(get_account))
        .route("/api/wallet/ledger/{user_id}", get(get_ledger))
        .route(
            "/api/wallet/holds-by-reservation/{reservation_id}",
            get(holds_by_reservation),
        )
}

async fn place_hold(
    State(state): State<AppState>,
    Json(req): Json<HoldRequest>,
) -> Result<Json<WalletReceipt>, AppError> {
    Ok(Json(state.engine.hold(req).await?))
}

async fn release_hold(
    State(state): State<AppState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<WalletReceipt>, AppError> {
    Ok(Json(state.engine.release(req).await?))
}

async fn refund(
    State(state): State<AppState>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<WalletReceipt>, AppError> {
    Ok(Json(state.engine.refund(req).await?))
}

async fn withdraw(
    State(state): State<AppState>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WalletReceipt>, AppError> {
    Ok(Json(state.engine.withdraw(req).await?))
}

async fn complete_trip(
    State(state): State<AppState>,
    Json(req): Json<CompleteTripCheck>,
) -> Result<Json<SettlementReceipt>, AppError> {
    Ok(Json(state.engine.complete_trip(req).await?))
}

/// Reading an account creates it; a first-time user sees zero balances, not
/// a 404.
async fn get_account(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Account> {
    Json(state.engine.get_account(&user_id).await)
}

#[derive(Debug, Deserialize)]
struct LedgerQuery {
    limit: Option<usize>,
}

async fn get_ledger(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LedgerQuery>,
) -> Json<Vec<LedgerEntry>> {
    let limit = query.limit.unwrap_or(state.business_rules.ledger_page_size);
    Json(state.engine.ledger_for_user(&user_id, limit).await)
}

async fn holds_by_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> Json<Vec<HoldRecord>> {
    Json(state.engine.holds_for_reservation(reservation_id).await)
}
