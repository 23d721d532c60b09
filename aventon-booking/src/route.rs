use aventon_core::{Cents, EngineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A driver's published route. The route aggregate owns the seat count the
/// settlement engine decrements and restores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub driver_id: String,
    pub origin: String,
    pub destination: String,
    pub price_cents: Cents,
    pub total_seats: i32,
    pub available_seats: i32,
    pub pickup_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct RouteBook {
    routes: HashMap<Uuid, Route>,
}

impl RouteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, route: Route) -> &Route {
        let id = route.id;
        self.routes.insert(id, route);
        &self.routes[&id]
    }

    pub fn get(&self, route_id: Uuid) -> Result<&Route, EngineError> {
        self.routes
            .get(&route_id)
            .ok_or_else(|| EngineError::NotFound(format!("route {route_id}")))
    }

    /// For non-seat field edits. Seat changes go through the conditional
    /// operations below.
    pub fn get_mut(&mut self, route_id: Uuid) -> Result<&mut Route, EngineError> {
        self.routes
            .get_mut(&route_id)
            .ok_or_else(|| EngineError::NotFound(format!("route {route_id}")))
    }

    /// Atomic conditional decrement: succeeds only while enough seats
    /// remain. This is the replacement for the client's read-modify-write
    /// PUT; `available_seats` can never go negative, and concurrent
    /// reservations cannot oversell.
    pub fn reserve_seats(&mut self, route_id: Uuid, seats: i32) -> Result<&Route, EngineError> {
        let route = self
            .routes
            .get_mut(&route_id)
            .ok_or_else(|| EngineError::NotFound(format!("route {route_id}")))?;
        if route.available_seats < seats {
            return Err(EngineError::OversoldSeats {
                requested: seats,
                available: route.available_seats,
            });
        }
        route.available_seats -= seats;
        Ok(route)
    }

    /// Compensating increment on cancellation or rolled-back creation.
    /// Capped at the route's capacity.
    pub fn restore_seats(&mut self, route_id: Uuid, seats: i32) -> Result<&Route, EngineError> {
        let route = self
            .routes
            .get_mut(&route_id)
            .ok_or_else(|| EngineError::NotFound(format!("route {route_id}")))?;
        route.available_seats = (route.available_seats + seats).min(route.total_seats);
        Ok(route)
    }

    /// Absolute seat update from the driver's route edit. Applied in one
    /// step under the engine lock; negative values are rejected and raising
    /// seats above the old capacity grows the capacity with it.
    pub fn set_available_seats(&mut self, route_id: Uuid, seats: i32) -> Result<&Route, EngineError> {
        if seats < 0 {
            return Err(EngineError::OversoldSeats {
                requested: seats,
                available: 0,
            });
        }
        let route = self
            .routes
            .get_mut(&route_id)
            .ok_or_else(|| EngineError::NotFound(format!("route {route_id}")))?;
        route.available_seats = seats;
        if seats > route.total_seats {
            route.total_seats = seats;
        }
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(seats: i32) -> Route {
        Route {
            id: Uuid::new_v4(),
            driver_id: "driver-1".to_string(),
            origin: "Campus Norte".to_string(),
            destination: "Centro".to_string(),
            price_cents: 8_000,
            total_seats: seats,
            available_seats: seats,
            pickup_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_reserve_is_conditional() {
        let mut book = RouteBook::new();
        let id = book.insert(route(1)).id;

        book.reserve_seats(id, 1).unwrap();
        let err = book.reserve_seats(id, 1).unwrap_err();
        assert_eq!(err, EngineError::OversoldSeats { requested: 1, available: 0 });
        assert_eq!(book.get(id).unwrap().available_seats, 0);
    }

    #[test]
    fn test_restore_capped_at_capacity() {
        let mut book = RouteBook::new();
        let id = book.insert(route(3)).id;

        book.reserve_seats(id, 2).unwrap();
        book.restore_seats(id, 2).unwrap();
        book.restore_seats(id, 5).unwrap();
        assert_eq!(book.get(id).unwrap().available_seats, 3);
    }

    #[test]
    fn test_set_available_rejects_negative() {
        let mut book = RouteBook::new();
        let id = book.insert(route(3)).id;
        assert!(book.set_available_seats(id, -1).is_err());
        book.set_available_seats(id, 5).unwrap();
        let r = book.get(id).unwrap();
        assert_eq!(r.available_seats, 5);
        assert_eq!(r.total_seats, 5);
    }

    #[test]
    fn test_unknown_route_not_found() {
        let mut book = RouteBook::new();
        assert!(matches!(
            book.reserve_seats(Uuid::new_v4(), 1),
            Err(EngineError::NotFound(_))
        ));
    }
}
