use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }
}

/// A building floor. Each floor is an independent booking partition with its
/// own room catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Floor(pub u8);

impl fmt::Display for Floor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
        }
    }
}

/// Who asked for the room. `user_id` is the owning identity (an email
/// address) and is what ownership checks compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub user_id: String,
    pub name: String,
    pub department: String,
    pub phone: Option<String>,
    pub cpr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub floor: Floor,
    pub room: String,
    pub start: Ms,
    pub end: Ms,
    pub status: BookingStatus,
    pub requester: Requester,
    /// Display name captured at creation; never re-derived.
    pub booked_by: String,
    pub created_at: Ms,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn is_pending(&self) -> bool {
        self.status == BookingStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.status == BookingStatus::Approved
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.requester.user_id.eq_ignore_ascii_case(user_id)
    }
}

/// A slot someone wants: the input to the conflict evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub floor: Floor,
    pub room: String,
    pub start: Ms,
    pub end: Ms,
}

impl Candidate {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// Last-used contact details, cached per user to pre-fill the next form.
/// Advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub department: String,
    pub phone: Option<String>,
    pub cpr: Option<String>,
}

/// Why a booking record disappeared. Deletion is terminal for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalReason {
    Declined,
    Cancelled,
    Withdrawn,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Declined => "declined",
            RemovalReason::Cancelled => "cancelled",
            RemovalReason::Withdrawn => "withdrawn",
        }
    }
}

/// All bookings of one floor, sorted by `start`.
#[derive(Debug, Clone)]
pub struct FloorState {
    pub floor: Floor,
    pub bookings: Vec<Booking>,
}

impl FloorState {
    pub fn new(floor: Floor) -> Self {
        Self {
            floor,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.start, |b| b.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query window, any room.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.end > query.start)
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingSubmitted {
        booking: Booking,
    },
    /// One approval plus its cascade, committed as a single record.
    BookingApproved {
        id: Ulid,
        floor: Floor,
        declined: Vec<Ulid>,
    },
    BookingRemoved {
        id: Ulid,
        floor: Floor,
        reason: RemovalReason,
    },
    ProfileSaved {
        user_id: String,
        profile: UserProfile,
    },
}

impl Event {
    /// The floor partition an event belongs to, if any.
    pub fn floor(&self) -> Option<Floor> {
        match self {
            Event::BookingSubmitted { booking } => Some(booking.floor),
            Event::BookingApproved { floor, .. } | Event::BookingRemoved { floor, .. } => {
                Some(*floor)
            }
            Event::ProfileSaved { .. } => None,
        }
    }
}
