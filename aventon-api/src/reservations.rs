use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use aventon_booking::{Reservation, ReservationStatus};
use aventon_core::EngineError;
use aventon_settlement::{CreateReservationRequest, ReservationReceipt, SettlementReceipt};

use crate::{error::AppError, middleware::auth::Claims, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/reservations", post(create_reservation).get(list_reservations))
        .route("/api/reservations/{id}", get(get_reservation).patch(patch_reservation))
        .route("/api/reservations/{id}/complete", post(complete_reservation))
}

async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Json<ReservationReceipt>, AppError> {
    Ok(Json(state.engine.create_reservation(req).await?))
}

async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.engine.get_reservation(id).await?))
}

/// Reservations the caller is a party to, passenger or driver side.
async fn list_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Json<Vec<Reservation>> {
    Json(state.engine.list_reservations(&claims.sub).await)
}

#[derive(Debug, Deserialize)]
struct PatchReservationRequest {
    status: ReservationStatus,
}

/// Status moves the client drives directly: CONFIRMED is a plain
/// transition, CANCELLED runs the full cancellation settlement. COMPLETED
/// must go through the code-checked completion endpoint.
async fn patch_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PatchReservationRequest>,
) -> Result<Json<Value>, AppError> {
    let body = match req.status {
        ReservationStatus::Confirmed => {
            let reservation = state.engine.confirm_reservation(id).await?;
            serde_json::to_value(reservation)
        }
        ReservationStatus::Cancelled => {
            let receipt = state.engine.cancel_reservation(id).await?;
            serde_json::to_value(receipt)
        }
        ReservationStatus::Completed | ReservationStatus::Pending => {
            let current = state.engine.get_reservation(id).await?;
            return Err(EngineError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: req.status.as_str().to_string(),
            }
            .into());
        }
    };
    body.map(Json)
        .map_err(|e| AppError::InternalServerError(format!("Serialization failed: {}", e)))
}

#[derive(Debug, Deserialize)]
struct CompleteRequest {
    code: String,
}

async fn complete_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<SettlementReceipt>, AppError> {
    Ok(Json(state.engine.complete_reservation(id, &req.code).await?))
}
