use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{evaluate_floor, now_ms, overlapping_pending, validate_candidate, validate_requester};
use super::{profile_key, Engine, EngineError, WalCommand};

/// Result of an approval. `declined` are the pending siblings the approval
/// cascaded into deleting, as they were just before deletion.
#[derive(Debug, Clone)]
pub struct Approval {
    pub booking: Booking,
    pub declined: Vec<Booking>,
    /// The booking was approved before this call; nothing changed.
    pub already_approved: bool,
}

impl Engine {
    /// Create a pending booking. The candidate is evaluated again here under
    /// the floor's write lock, so two racing submissions cannot both slip past
    /// the pending bound.
    pub async fn submit(
        &self,
        candidate: Candidate,
        requester: Requester,
        booked_by: String,
    ) -> Result<Booking, EngineError> {
        let now = now_ms();
        validate_requester(&requester)?;
        validate_candidate(&candidate, now)?;

        let rs = self.partition(candidate.floor)?;
        let mut guard = rs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_FLOOR {
            return Err(EngineError::LimitExceeded("too many bookings on floor"));
        }

        let decision = evaluate_floor(&guard, &candidate);
        if !decision.is_ok() {
            metrics::counter!(observability::CONFLICT_REJECTIONS_TOTAL, "reason" => decision.reason())
                .increment(1);
            decision.into_result()?;
        }

        let booking = Booking {
            id: Ulid::new(),
            floor: candidate.floor,
            room: candidate.room,
            start: candidate.start,
            end: candidate.end,
            status: BookingStatus::Pending,
            requester,
            booked_by,
            created_at: now,
        };
        let event = Event::BookingSubmitted {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!(
            "booking {} submitted: floor {} {} by {}",
            booking.id, booking.floor, booking.room, booking.requester.user_id
        );
        Ok(booking)
    }

    /// Approve a pending booking and delete every other pending booking in
    /// the same room that overlaps it. The approval and its cascade are one
    /// WAL record applied under one lock. Approving an approved booking
    /// changes nothing.
    pub async fn approve(&self, id: Ulid) -> Result<Approval, EngineError> {
        let mut guard = self.resolve_booking_write(id).await?;
        let booking = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        if booking.is_approved() {
            debug!("booking {id} already approved");
            return Ok(Approval {
                booking,
                declined: Vec::new(),
                already_approved: true,
            });
        }

        // Cascades keep this from happening; refuse rather than hold two
        // approved bookings on one slot.
        if let Some(clash) = guard
            .overlapping(&booking.span())
            .find(|b| b.id != id && b.is_approved() && b.room == booking.room)
        {
            return Err(EngineError::ApprovedConflict(clash.id));
        }

        let declined_ids = overlapping_pending(&guard, &booking);
        let declined: Vec<Booking> = declined_ids
            .iter()
            .filter_map(|d| guard.get(*d).cloned())
            .collect();

        let event = Event::BookingApproved {
            id,
            floor: booking.floor,
            declined: declined_ids,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let booking = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !declined.is_empty() {
            metrics::counter!(observability::CASCADE_DECLINED_TOTAL).increment(declined.len() as u64);
        }
        info!(
            "booking {id} approved on floor {}; {} overlapping requests declined",
            booking.floor,
            declined.len()
        );
        Ok(Approval {
            booking,
            declined,
            already_approved: false,
        })
    }

    /// Delete a booking that is currently in `expected` state. Decline and
    /// withdrawal of a request expect `Pending`; cancel expects `Approved`.
    pub async fn remove(
        &self,
        id: Ulid,
        expected: BookingStatus,
        reason: RemovalReason,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_booking_write(id).await?;
        let booking = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;
        if booking.status != expected {
            return Err(EngineError::InvalidState {
                id,
                status: booking.status,
                expected,
            });
        }

        let event = Event::BookingRemoved {
            id,
            floor: booking.floor,
            reason,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("booking {id} {} on floor {}", reason.as_str(), booking.floor);
        Ok(booking)
    }

    /// Upsert the last-used contact details for `user_id`.
    pub async fn save_profile(&self, user_id: &str, profile: UserProfile) -> Result<(), EngineError> {
        let key = profile_key(user_id);
        if key.is_empty() {
            return Err(EngineError::Invalid("profile needs a user id"));
        }
        if self.profiles.get(&key).is_some_and(|p| *p == profile) {
            return Ok(());
        }
        let event = Event::ProfileSaved {
            user_id: key.clone(),
            profile: profile.clone(),
        };
        self.wal_append(&event).await?;
        self.profiles.insert(key, profile);
        Ok(())
    }

    /// Rewrite the WAL as the minimal event set: one `ProfileSaved` per
    /// cached profile and one `BookingSubmitted` per live booking, carrying
    /// its current status. Floor read locks are held until the swap so no
    /// booking write can land between the snapshot and the rename.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events: Vec<Event> = self
            .profiles
            .iter()
            .map(|e| Event::ProfileSaved {
                user_id: e.key().clone(),
                profile: e.value().clone(),
            })
            .collect();

        let mut partitions: Vec<_> = self.floors.iter().map(|e| (*e.key(), e.value().clone())).collect();
        partitions.sort_by_key(|(floor, _)| *floor);

        let mut guards = Vec::with_capacity(partitions.len());
        for (_, rs) in &partitions {
            guards.push(rs.clone().read_owned().await);
        }
        for guard in &guards {
            events.extend(
                guard
                    .bookings
                    .iter()
                    .map(|b| Event::BookingSubmitted { booking: b.clone() }),
            );
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        drop(guards);
        debug!("WAL compacted to {count} records");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
