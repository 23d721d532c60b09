pub mod reservation;
pub mod route;

pub use reservation::{Reservation, ReservationStatus};
pub use route::{Route, RouteBook};
