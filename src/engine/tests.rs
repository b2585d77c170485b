use super::*;
use crate::limits::*;
use crate::model::fixtures::{requester, H, M};

use tokio::sync::broadcast::error::TryRecvError;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roombook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> (Engine, PathBuf) {
    let path = test_wal_path(name);
    let engine = Engine::new(path.clone(), Arc::new(LiveHub::new())).unwrap();
    (engine, path)
}

/// Midnight two days from now: always in the future and on the grid.
fn day() -> Ms {
    (now_ms() / (24 * H) + 2) * 24 * H
}

fn slot(floor: u8, room: &str, start: Ms, end: Ms) -> Candidate {
    Candidate {
        floor: Floor(floor),
        room: room.into(),
        start,
        end,
    }
}

async fn submit_as(engine: &Engine, user: &str, c: Candidate) -> Result<Booking, EngineError> {
    engine.submit(c, requester(user), user.to_string()).await
}

// ── Submission ───────────────────────────────────────────

#[tokio::test]
async fn submitted_booking_reads_back_unchanged() {
    let (engine, _) = new_engine("submit_roundtrip.wal");
    let d = day();
    let c = slot(10, "Room2", d + 9 * H, d + 10 * H + 30 * M);
    let mut who = requester("amal");
    who.department = "Ældre & Sundhed".into();

    let b = engine.submit(c.clone(), who.clone(), "Amal H.".into()).await.unwrap();
    assert_eq!(b.status, BookingStatus::Pending);

    let read = engine.get_booking(b.id).await.unwrap();
    assert_eq!((read.floor, read.room.as_str(), read.start, read.end), (c.floor, "Room2", c.start, c.end));
    assert_eq!(read.requester, who);
    assert_eq!(read.booked_by, "Amal H.");
    assert_eq!(engine.snapshot(Floor(10)).await.unwrap(), vec![read]);
    assert!(engine.snapshot(Floor(7)).await.unwrap().is_empty());
}

#[tokio::test]
async fn submit_rejects_overlap_with_approved() {
    let (engine, _) = new_engine("submit_vs_approved.wal");
    let d = day();
    let b = submit_as(&engine, "amal", slot(10, "Room1", d + 10 * H, d + 11 * H)).await.unwrap();
    engine.approve(b.id).await.unwrap();

    let err = submit_as(&engine, "bo", slot(10, "Room1", d + 10 * H + 30 * M, d + 11 * H + 30 * M))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ApprovedConflict(with) if with == b.id));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    submit_as(&engine, "bo", slot(10, "Room2", d + 10 * H + 30 * M, d + 11 * H + 30 * M))
        .await
        .unwrap();
}

#[tokio::test]
async fn fifth_overlapping_pending_is_refused() {
    let (engine, _) = new_engine("saturation.wal");
    let d = day();
    for user in ["a", "b", "c", "d"] {
        submit_as(&engine, user, slot(10, "Room1", d + 9 * H, d + 10 * H)).await.unwrap();
    }
    let err = submit_as(&engine, "e", slot(10, "Room1", d + 9 * H + 30 * M, d + 10 * H))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PendingSaturated(4)));

    // Same room, adjacent slot: unaffected by the saturated one.
    submit_as(&engine, "e", slot(10, "Room1", d + 10 * H, d + 11 * H)).await.unwrap();
    // Same times, other floor's Room1: separate partition.
    submit_as(&engine, "e", slot(7, "Room1", d + 9 * H, d + 10 * H)).await.unwrap();
}

#[tokio::test]
async fn concurrent_submissions_respect_pending_bound() {
    let path = test_wal_path("concurrent_submit.wal");
    let engine = Arc::new(Engine::new(path, Arc::new(LiveHub::new())).unwrap());
    let d = day();

    let mut handles = Vec::new();
    for i in 0..12 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let user = format!("user{i}");
            engine
                .submit(slot(10, "Room3", d + 13 * H, d + 14 * H), requester(&user), user)
                .await
        }));
    }
    let mut accepted = 0;
    let mut saturated = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(EngineError::PendingSaturated(_)) => saturated += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(accepted, MAX_PENDING_PER_SLOT);
    assert_eq!(saturated, 12 - MAX_PENDING_PER_SLOT);
}

#[tokio::test]
async fn submit_validation_happens_before_any_write() {
    let (engine, path) = new_engine("submit_validation.wal");
    let d = day();

    let unknown_room = submit_as(&engine, "a", slot(7, "Room3", d + 9 * H, d + 10 * H)).await;
    assert!(matches!(unknown_room, Err(EngineError::UnknownRoom { .. })));

    let unknown_floor = submit_as(&engine, "a", slot(3, "Room1", d + 9 * H, d + 10 * H)).await;
    assert!(unknown_floor.is_err());

    let past = submit_as(&engine, "a", slot(10, "Room1", d - 3 * 24 * H, d - 3 * 24 * H + H)).await;
    assert!(matches!(past, Err(EngineError::Invalid("start is in the past"))));

    let mut who = requester("a");
    who.phone = Some("12-34".into());
    let bad_phone = engine.submit(slot(10, "Room1", d + 9 * H, d + 10 * H), who, "a".into()).await;
    assert_eq!(bad_phone.unwrap_err().kind(), ErrorKind::Validation);

    assert_eq!(engine.booking_count(), 0);
    assert_eq!(engine.wal_appends_since_compact().await, 0);
    drop(engine);
    assert!(crate::wal::Wal::replay(&path).unwrap().events.is_empty());
}

// ── Approval cascade ─────────────────────────────────────

#[tokio::test]
async fn approve_cascades_to_overlapping_pending() {
    let (engine, _) = new_engine("approve_cascade.wal");
    let d = day();
    let b = submit_as(&engine, "b", slot(10, "Room1", d + 10 * H, d + 11 * H)).await.unwrap();
    let c = submit_as(&engine, "c", slot(10, "Room1", d + 10 * H + 30 * M, d + 11 * H + 30 * M)).await.unwrap();
    let dd = submit_as(&engine, "d", slot(10, "Room1", d + 9 * H, d + 10 * H + 30 * M)).await.unwrap();
    let touching = submit_as(&engine, "t", slot(10, "Room1", d + 11 * H, d + 12 * H)).await.unwrap();
    let other_room = submit_as(&engine, "o", slot(10, "Room2", d + 10 * H, d + 11 * H)).await.unwrap();

    let approval = engine.approve(b.id).await.unwrap();
    assert!(!approval.already_approved);
    assert_eq!(approval.booking.status, BookingStatus::Approved);
    let mut declined: Vec<Ulid> = approval.declined.iter().map(|x| x.id).collect();
    declined.sort();
    let mut expected = vec![c.id, dd.id];
    expected.sort();
    assert_eq!(declined, expected);

    assert!(matches!(engine.get_booking(c.id).await, Err(EngineError::NotFound(_))));
    assert!(matches!(engine.get_booking(dd.id).await, Err(EngineError::NotFound(_))));
    assert_eq!(engine.get_booking(touching.id).await.unwrap().status, BookingStatus::Pending);
    assert_eq!(engine.get_booking(other_room.id).await.unwrap().status, BookingStatus::Pending);
    assert_eq!(engine.snapshot(Floor(10)).await.unwrap().len(), 3);
}

#[tokio::test]
async fn reapprove_is_a_noop() {
    let (engine, _) = new_engine("reapprove.wal");
    let d = day();
    let b = submit_as(&engine, "b", slot(7, "Room2", d + 8 * H, d + 9 * H)).await.unwrap();
    engine.approve(b.id).await.unwrap();
    let appends = engine.wal_appends_since_compact().await;

    let again = engine.approve(b.id).await.unwrap();
    assert!(again.already_approved);
    assert!(again.declined.is_empty());
    assert_eq!(engine.wal_appends_since_compact().await, appends);
}

#[tokio::test]
async fn approve_unknown_is_not_found() {
    let (engine, _) = new_engine("approve_unknown.wal");
    let err = engine.approve(Ulid::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Removal ──────────────────────────────────────────────

#[tokio::test]
async fn decline_twice_is_not_found_second_time() {
    let (engine, _) = new_engine("decline_twice.wal");
    let d = day();
    let b = submit_as(&engine, "b", slot(10, "Room3", d + 8 * H, d + 9 * H)).await.unwrap();

    let removed = engine.remove(b.id, BookingStatus::Pending, RemovalReason::Declined).await.unwrap();
    assert_eq!(removed.id, b.id);
    let again = engine.remove(b.id, BookingStatus::Pending, RemovalReason::Declined).await;
    assert!(matches!(again, Err(EngineError::NotFound(id)) if id == b.id));
    assert_eq!(engine.booking_count(), 0);
}

#[tokio::test]
async fn cancel_needs_approved_and_decline_needs_pending() {
    let (engine, _) = new_engine("remove_state.wal");
    let d = day();
    let b = submit_as(&engine, "b", slot(10, "Room1", d + 8 * H, d + 9 * H)).await.unwrap();

    let early_cancel = engine.remove(b.id, BookingStatus::Approved, RemovalReason::Cancelled).await;
    assert!(matches!(early_cancel, Err(EngineError::InvalidState { .. })));

    engine.approve(b.id).await.unwrap();
    let late_decline = engine.remove(b.id, BookingStatus::Pending, RemovalReason::Declined).await;
    assert!(matches!(late_decline, Err(EngineError::InvalidState { .. })));

    engine.remove(b.id, BookingStatus::Approved, RemovalReason::Cancelled).await.unwrap();
    let twice = engine.remove(b.id, BookingStatus::Approved, RemovalReason::Cancelled).await;
    assert!(matches!(twice, Err(EngineError::NotFound(_))));

    // Slot is free again.
    submit_as(&engine, "c", slot(10, "Room1", d + 8 * H, d + 9 * H)).await.unwrap();
}

// ── Profiles ─────────────────────────────────────────────

#[tokio::test]
async fn profile_upsert_and_lookup_ignores_case() {
    let (engine, _) = new_engine("profiles.wal");
    let profile = UserProfile {
        name: "Amal".into(),
        department: "Finance".into(),
        phone: Some("36001234".into()),
        cpr: None,
    };
    engine.save_profile("Amal@Example.org", profile.clone()).await.unwrap();
    assert_eq!(engine.profile("amal@example.org"), Some(profile.clone()));

    // Unchanged profile is not written again.
    let appends = engine.wal_appends_since_compact().await;
    engine.save_profile("amal@example.org", profile).await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, appends);

    assert!(engine.save_profile("  ", UserProfile::default()).await.is_err());
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let (engine, path) = new_engine("restart.wal");
    let d = day();
    let keep = submit_as(&engine, "k", slot(10, "Room1", d + 10 * H, d + 11 * H)).await.unwrap();
    let lose = submit_as(&engine, "l", slot(10, "Room1", d + 10 * H, d + 11 * H)).await.unwrap();
    let pending = submit_as(&engine, "p", slot(7, "Room1", d + 14 * H, d + 15 * H)).await.unwrap();
    let gone = submit_as(&engine, "g", slot(7, "Room2", d + 14 * H, d + 15 * H)).await.unwrap();
    engine.approve(keep.id).await.unwrap();
    engine.remove(gone.id, BookingStatus::Pending, RemovalReason::Withdrawn).await.unwrap();
    engine.save_profile("k@example.org", UserProfile::default()).await.unwrap();
    let ten = engine.snapshot(Floor(10)).await.unwrap();
    let seven = engine.snapshot(Floor(7)).await.unwrap();
    drop(engine);

    let engine = Engine::new(path, Arc::new(LiveHub::new())).unwrap();
    assert_eq!(engine.snapshot(Floor(10)).await.unwrap(), ten);
    assert_eq!(engine.snapshot(Floor(7)).await.unwrap(), seven);
    assert_eq!(engine.get_booking(keep.id).await.unwrap().status, BookingStatus::Approved);
    assert!(engine.get_booking(lose.id).await.is_err());
    assert!(engine.get_booking(pending.id).await.is_ok());
    assert!(engine.profile("k@example.org").is_some());
}

#[tokio::test]
async fn writes_after_a_torn_tail_survive_the_next_restart() {
    use std::io::Write;

    let (engine, path) = new_engine("torn_then_write.wal");
    let d = day();
    let before = submit_as(&engine, "a", slot(10, "Room1", d + 9 * H, d + 10 * H)).await.unwrap();
    drop(engine);

    // Crash mid-header: two bytes of a length prefix.
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[0x10, 0x00]).unwrap();
    }

    let engine = Engine::new(path.clone(), Arc::new(LiveHub::new())).unwrap();
    assert!(engine.get_booking(before.id).await.is_ok());
    let after = submit_as(&engine, "b", slot(10, "Room2", d + 9 * H, d + 10 * H)).await.unwrap();
    engine.approve(after.id).await.unwrap();
    drop(engine);

    assert!(crate::wal::Wal::replay(&path).unwrap().discarded_from.is_none());
    let engine = Engine::new(path, Arc::new(LiveHub::new())).unwrap();
    assert!(engine.get_booking(before.id).await.is_ok());
    assert_eq!(engine.get_booking(after.id).await.unwrap().status, BookingStatus::Approved);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let (engine, path) = new_engine("compaction.wal");
    let d = day();
    let approved = submit_as(&engine, "a", slot(10, "Room2", d + 9 * H, d + 10 * H)).await.unwrap();
    engine.approve(approved.id).await.unwrap();
    for i in 0..20 {
        let start = d + 12 * H + (i % 4) * 30 * M;
        let b = submit_as(&engine, "churn", slot(10, "Room3", start, start + 30 * M)).await.unwrap();
        engine.remove(b.id, BookingStatus::Pending, RemovalReason::Declined).await.unwrap();
    }
    engine.save_profile("a@example.org", UserProfile::default()).await.unwrap();
    assert!(engine.wal_appends_since_compact().await > 40);
    let before = engine.snapshot(Floor(10)).await.unwrap();

    engine.compact_wal().await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, 0);
    let replay = crate::wal::Wal::replay(&path).unwrap();
    assert_eq!(replay.events.len(), 2);

    // Appends after compaction land in the new file.
    let later = submit_as(&engine, "b", slot(7, "Room1", d + 9 * H, d + 10 * H)).await.unwrap();
    drop(engine);

    let engine = Engine::new(path, Arc::new(LiveHub::new())).unwrap();
    assert_eq!(engine.snapshot(Floor(10)).await.unwrap(), before);
    assert!(engine.get_booking(later.id).await.is_ok());
    assert!(engine.profile("a@example.org").is_some());
}

// ── Live snapshots ───────────────────────────────────────

#[tokio::test]
async fn live_subscribers_get_snapshot_per_change() {
    let (engine, _) = new_engine("live.wal");
    let d = day();
    let mut rx = engine.live.subscribe(Floor(10));
    let mut seven = engine.live.subscribe(Floor(7));

    let b = submit_as(&engine, "a", slot(10, "Room1", d + 9 * H, d + 10 * H)).await.unwrap();
    let first = rx.recv().await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, b.id);

    engine.approve(b.id).await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(second[0].status, BookingStatus::Approved);

    engine.remove(b.id, BookingStatus::Approved, RemovalReason::Cancelled).await.unwrap();
    assert!(rx.recv().await.unwrap().is_empty());

    assert!(matches!(seven.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn evaluate_candidate_reports_without_writing() {
    let (engine, _) = new_engine("evaluate.wal");
    let d = day();
    let b = submit_as(&engine, "a", slot(10, "Room1", d + 9 * H, d + 10 * H)).await.unwrap();
    engine.approve(b.id).await.unwrap();

    let decision = engine
        .evaluate_candidate(&slot(10, "Room1", d + 9 * H + 30 * M, d + 10 * H + 30 * M))
        .await
        .unwrap();
    assert_eq!(decision, Decision::ApprovedConflict { with: b.id });
    let free = engine.evaluate_candidate(&slot(10, "Room1", d + 10 * H, d + 11 * H)).await.unwrap();
    assert!(free.is_ok());
    assert!(engine.evaluate_candidate(&slot(10, "Room9", d, d + H)).await.is_err());
    assert_eq!(engine.booking_count(), 1);
}
