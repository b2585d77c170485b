use serde::Serialize;
use ulid::Ulid;

use crate::catalog;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Outcome of checking a candidate slot against a snapshot of bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "kebab-case")]
pub enum Decision {
    Ok,
    ApprovedConflict { with: Ulid },
    PendingSaturated { pending: usize },
}

impl Decision {
    pub fn is_ok(&self) -> bool {
        matches!(self, Decision::Ok)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Decision::Ok => "ok",
            Decision::ApprovedConflict { .. } => "approved-conflict",
            Decision::PendingSaturated { .. } => "pending-saturated",
        }
    }

    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            Decision::Ok => Ok(()),
            Decision::ApprovedConflict { with } => Err(EngineError::ApprovedConflict(with)),
            Decision::PendingSaturated { pending } => Err(EngineError::PendingSaturated(pending)),
        }
    }
}

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Decide whether `candidate` is bookable given `snapshot`. Pure: the result
/// depends only on the arguments. Bookings on other floors or rooms are
/// ignored, so the snapshot may be a whole floor or more. A candidate with
/// `start >= end` overlaps nothing; submission rejects it separately.
pub fn evaluate(candidate: &Candidate, snapshot: &[Booking]) -> Decision {
    decide(candidate, snapshot.iter())
}

/// Same as [`evaluate`], but uses the floor's start-ordered index to skip
/// bookings that cannot overlap.
pub(crate) fn evaluate_floor(fs: &FloorState, candidate: &Candidate) -> Decision {
    if fs.floor != candidate.floor || candidate.start >= candidate.end {
        return Decision::Ok;
    }
    decide(candidate, fs.overlapping(&candidate.span()))
}

fn decide<'a>(candidate: &Candidate, bookings: impl Iterator<Item = &'a Booking>) -> Decision {
    let mut pending = 0usize;
    for b in bookings {
        // Half-open overlap on the raw fields; neither side is trusted to be well formed.
        let overlaps = b.start < candidate.end && b.end > candidate.start;
        if b.floor != candidate.floor || b.room != candidate.room || !overlaps {
            continue;
        }
        match b.status {
            BookingStatus::Approved => return Decision::ApprovedConflict { with: b.id },
            BookingStatus::Pending => pending += 1,
        }
    }
    if pending >= MAX_PENDING_PER_SLOT {
        Decision::PendingSaturated { pending }
    } else {
        Decision::Ok
    }
}

/// Other pending bookings in the same room whose span overlaps `approved`.
/// These are what an approval cascades into declining.
pub(crate) fn overlapping_pending(fs: &FloorState, approved: &Booking) -> Vec<Ulid> {
    fs.overlapping(&approved.span())
        .filter(|b| b.id != approved.id && b.is_pending() && b.room == approved.room)
        .map(|b| b.id)
        .collect()
}

pub(crate) fn validate_candidate(candidate: &Candidate, now: Ms) -> Result<(), EngineError> {
    if candidate.room.is_empty() {
        return Err(EngineError::Invalid("room is required"));
    }
    if candidate.room.len() > MAX_ROOM_ID_LEN || !catalog::has_room(candidate.floor, &candidate.room) {
        return Err(EngineError::UnknownRoom {
            floor: candidate.floor,
            room: candidate.room.clone(),
        });
    }
    if candidate.start >= candidate.end {
        return Err(EngineError::Invalid("start must be before end"));
    }
    if candidate.start < MIN_VALID_TIMESTAMP_MS || candidate.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if candidate.start < now {
        return Err(EngineError::Invalid("start is in the past"));
    }
    let duration = candidate.end - candidate.start;
    if duration > MAX_BOOKING_DURATION_MS {
        return Err(EngineError::Invalid("booking longer than 5 hours"));
    }
    if duration % SLOT_GRANULARITY_MS != 0 || candidate.start % SLOT_GRANULARITY_MS != 0 {
        return Err(EngineError::Invalid("slot must follow the 30 minute grid"));
    }
    Ok(())
}

pub(crate) fn validate_requester(requester: &Requester) -> Result<(), EngineError> {
    if requester.user_id.trim().is_empty() {
        return Err(EngineError::Invalid("requester identity is required"));
    }
    if requester.name.trim().is_empty() {
        return Err(EngineError::Invalid("name is required"));
    }
    if requester.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    if requester.department.trim().is_empty() {
        return Err(EngineError::Invalid("department is required"));
    }
    if requester.department.len() > MAX_DEPARTMENT_LEN {
        return Err(EngineError::LimitExceeded("department too long"));
    }
    if let Some(phone) = &requester.phone
        && !all_digits(phone, PHONE_DIGITS) {
            return Err(EngineError::Invalid("phone must be 8 digits"));
        }
    if let Some(cpr) = &requester.cpr
        && !all_digits(cpr, CPR_DIGITS) {
            return Err(EngineError::Invalid("CPR must be 9 digits"));
        }
    Ok(())
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}
