use thiserror::Error;
use ulid::Ulid;

use crate::model::{BookingStatus, Floor};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid booking: {0}")]
    Invalid(&'static str),
    #[error("unknown room {room} on floor {floor}")]
    UnknownRoom { floor: Floor, room: String },
    #[error("slot overlaps approved booking {0}")]
    ApprovedConflict(Ulid),
    #[error("slot already has {0} pending requests, contact the admin")]
    PendingSaturated(usize),
    #[error("unknown floor {0}")]
    UnknownFloor(Floor),
    #[error("booking not found: {0}")]
    NotFound(Ulid),
    #[error("booking {id} is {status:?}, expected {expected:?}")]
    InvalidState {
        id: Ulid,
        status: BookingStatus,
        expected: BookingStatus,
    },
    #[error("not allowed: {0}")]
    Forbidden(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Authorization,
    NotFound,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Persistence => "persistence",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Invalid(_)
            | EngineError::UnknownRoom { .. }
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::ApprovedConflict(_)
            | EngineError::PendingSaturated(_)
            | EngineError::InvalidState { .. } => ErrorKind::Conflict,
            EngineError::Forbidden(_) => ErrorKind::Authorization,
            EngineError::NotFound(_) | EngineError::UnknownFloor(_) => ErrorKind::NotFound,
            EngineError::WalError(_) => ErrorKind::Persistence,
        }
    }
}
