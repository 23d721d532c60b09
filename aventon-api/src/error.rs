use aventon_core::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    AuthenticationError(String),
    InternalServerError(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Engine(err) => (engine_status(&err), err.code(), err.to_string()),
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Map the engine taxonomy onto HTTP classes: 402 for money shortfalls,
/// 409 for state conflicts, 404 for unknowns, 400 for bad input.
fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        EngineError::InsufficientHold { .. }
        | EngineError::DuplicateOperation(_)
        | EngineError::InvalidTransition { .. }
        | EngineError::AlreadyTerminal(_)
        | EngineError::OversoldSeats { .. } => StatusCode::CONFLICT,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::WrongCode | EngineError::InvalidAmount(_) | EngineError::AmountOverflow => {
            StatusCode::BAD_REQUEST
        }
    }
}
