use thiserror::Error;

/// Engine-wide error taxonomy. Every variant carries a stable machine code
/// so the API can answer with something the client can branch on instead of
/// matching error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("insufficient hold: held {held}, requested {requested}")]
    InsufficientHold { held: i64, requested: i64 },

    #[error("operation {0} was already processed")]
    DuplicateOperation(String),

    #[error("invalid reservation transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("confirmation code does not match")]
    WrongCode,

    #[error("reservation already terminal ({0})")]
    AlreadyTerminal(String),

    #[error("not enough seats: requested {requested}, available {available}")]
    OversoldSeats { requested: i32, available: i32 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("amount must be a positive number of cents, got {0}")]
    InvalidAmount(i64),

    #[error("amount arithmetic overflowed")]
    AmountOverflow,
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            EngineError::InsufficientHold { .. } => "INSUFFICIENT_HOLD",
            EngineError::DuplicateOperation(_) => "DUPLICATE_OPERATION",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::WrongCode => "WRONG_CODE",
            EngineError::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            EngineError::OversoldSeats { .. } => "OVERSOLD_SEATS",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::InvalidAmount(_) => "INVALID_AMOUNT",
            EngineError::AmountOverflow => "AMOUNT_OVERFLOW",
        }
    }
}
