use crate::model::Ms;

pub const MINUTE_MS: Ms = 60_000;

/// Competing pending requests tolerated on one slot before it is saturated.
pub const MAX_PENDING_PER_SLOT: usize = 4;

/// Bookings start on, and last a multiple of, this grid.
pub const SLOT_GRANULARITY_MS: Ms = 30 * MINUTE_MS;

/// Longest single booking: 5 hours.
pub const MAX_BOOKING_DURATION_MS: Ms = 5 * 60 * MINUTE_MS;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_DEPARTMENT_LEN: usize = 120;
pub const MAX_ROOM_ID_LEN: usize = 32;
pub const PHONE_DIGITS: usize = 8;
pub const CPR_DIGITS: usize = 9;

pub const MAX_BOOKINGS_PER_FLOOR: usize = 100_000;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;
pub const LIVE_CHANNEL_CAPACITY: usize = 256;
