pub mod coordinator;
pub mod events;

pub use coordinator::{
    CancelReceipt, CompleteTripCheck, CreateReservationRequest, CreateRouteRequest, HoldRequest,
    RefundRequest, ReleaseRequest, ReservationReceipt, SettlementCoordinator, SettlementReceipt,
    UpdateRouteRequest, WalletReceipt, WithdrawRequest,
};
pub use events::SettlementEvent;
