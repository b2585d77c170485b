use ulid::Ulid;

use crate::model::*;

use super::conflict::{evaluate_floor, now_ms, validate_candidate};
use super::{profile_key, Decision, Engine, EngineError};

impl Engine {
    /// Current bookings of one floor, ordered by start.
    pub async fn snapshot(&self, floor: Floor) -> Result<Vec<Booking>, EngineError> {
        let rs = self.partition(floor)?;
        let guard = rs.read().await;
        Ok(guard.bookings.clone())
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let floor = self
            .booking_floor
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let rs = self.partition(floor)?;
        let guard = rs.read().await;
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Advisory pre-check against the floor as it is right now. Invalid
    /// candidates are errors; conflicts are a `Decision`.
    pub async fn evaluate_candidate(&self, candidate: &Candidate) -> Result<Decision, EngineError> {
        validate_candidate(candidate, now_ms())?;
        let rs = self.partition(candidate.floor)?;
        let guard = rs.read().await;
        Ok(evaluate_floor(&guard, candidate))
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(&profile_key(user_id)).map(|p| p.value().clone())
    }

    pub fn booking_count(&self) -> usize {
        self.booking_floor.len()
    }
}
