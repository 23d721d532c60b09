use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use aventon_booking::Route;
use aventon_settlement::{CreateRouteRequest, UpdateRouteRequest};

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/routes", post(create_route))
        .route("/api/routes/{id}", get(get_route).put(update_route))
}

async fn create_route(
    State(state): State<AppState>,
    Json(req): Json<CreateRouteRequest>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.engine.create_route(req).await?))
}

async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.engine.get_route(id).await?))
}

/// Partial update. Seat counts are applied as one atomic set inside the
/// engine rather than the client's read-modify-write PUT.
async fn update_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRouteRequest>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.engine.update_route(id, req).await?))
}
