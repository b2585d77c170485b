//! Booking lifecycle: `pending → approved → removed`, or `pending → removed`.
//!
//! Every transition checks the caller against the [`AdminPolicy`] (or, for
//! self-service, against the booking's owner) before touching the store, and
//! queues its notices only after the store has committed. Notices go
//! through the [`Outbox`]; their fate never changes a transition's result.

mod messages;

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;
use ulid::Ulid;

use crate::audit::AuditLedger;
use crate::engine::{Approval, Engine, EngineError};
use crate::identity::{AdminPolicy, Identity};
use crate::mailer::{Notice, Outbox};
use crate::model::*;
use crate::observability;

/// What a caller fills in to request a room. The floor comes from the URL;
/// name and department default to the caller's identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub room: String,
    pub start: Ms,
    pub end: Ms,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cpr: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn record<T>(transition: &'static str, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!(
        observability::TRANSITIONS_TOTAL,
        "transition" => transition,
        "outcome" => outcome
    )
    .increment(1);
}

pub struct Lifecycle {
    engine: Arc<Engine>,
    policy: Arc<AdminPolicy>,
    outbox: Outbox,
    audit: Option<AuditLedger>,
    portal_url: Option<String>,
    self_service: bool,
}

impl Lifecycle {
    pub fn new(engine: Arc<Engine>, policy: Arc<AdminPolicy>, outbox: Outbox) -> Self {
        Self {
            engine,
            policy,
            outbox,
            audit: None,
            portal_url: None,
            self_service: false,
        }
    }

    pub fn with_audit(mut self, audit: AuditLedger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = Some(url.into());
        self
    }

    /// Let owners withdraw their own requests and cancel their own bookings.
    pub fn with_self_service(mut self, enabled: bool) -> Self {
        self.self_service = enabled;
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn policy(&self) -> &AdminPolicy {
        &self.policy
    }

    fn admin_notices(&self, floor: Floor, mail: &messages::Mail, sender: &str) -> Vec<Notice> {
        self.policy
            .admins_for(floor)
            .iter()
            .map(|admin| mail.to(admin, sender))
            .collect()
    }

    /// Request a room. The booking is created `pending`; the caller's
    /// profile is remembered and the floor's admins are told.
    pub async fn submit(&self, caller: &Identity, floor: Floor, draft: Draft) -> Result<Booking, EngineError> {
        let result = self.submit_inner(caller, floor, draft).await;
        record("submit", &result);
        result
    }

    async fn submit_inner(&self, caller: &Identity, floor: Floor, draft: Draft) -> Result<Booking, EngineError> {
        let requester = Requester {
            user_id: caller.user_id.clone(),
            name: non_blank(draft.name).unwrap_or_else(|| caller.display_name.clone()),
            department: non_blank(draft.department).unwrap_or_else(|| caller.department.clone()),
            phone: non_blank(draft.phone),
            cpr: non_blank(draft.cpr),
        };
        let candidate = Candidate {
            floor,
            room: draft.room.trim().to_string(),
            start: draft.start,
            end: draft.end,
        };

        let booking = self
            .engine
            .submit(candidate, requester.clone(), caller.display_name.clone())
            .await?;

        let profile = UserProfile {
            name: requester.name,
            department: requester.department,
            phone: requester.phone,
            cpr: requester.cpr,
        };
        if let Err(e) = self.engine.save_profile(&caller.user_id, profile).await {
            warn!("could not remember profile for {}: {e}", caller.user_id);
        }
        if let Some(audit) = &self.audit {
            audit.record(&booking);
        }

        let mail = messages::submitted(&booking, self.portal_url.as_deref());
        self.outbox
            .enqueue_all(self.admin_notices(floor, &mail, &caller.user_id));
        Ok(booking)
    }

    /// Admin-only. Approving cascades into declining every overlapping
    /// pending request for the same room.
    pub async fn approve(&self, caller: &Identity, id: Ulid) -> Result<Approval, EngineError> {
        let result = self.approve_inner(caller, id).await;
        record("approve", &result);
        result
    }

    async fn approve_inner(&self, caller: &Identity, id: Ulid) -> Result<Approval, EngineError> {
        let booking = self.engine.get_booking(id).await?;
        if !self.policy.is_admin_for(caller, booking.floor) {
            return Err(EngineError::Forbidden("only an admin of this floor can approve"));
        }

        let approval = self.engine.approve(id).await?;
        if approval.already_approved {
            return Ok(approval);
        }

        let sender = caller.user_id.as_str();
        let approved = &approval.booking;
        let mut notices = vec![
            messages::approved(approved).to(&approved.requester.user_id, sender),
            messages::approved_admin(approved, approval.declined.len()).to(sender, sender),
        ];
        for declined in &approval.declined {
            notices.push(messages::cascade_declined(declined, approved).to(&declined.requester.user_id, sender));
        }
        if !approval.declined.is_empty() {
            notices.push(messages::cascade_summary(approved, &approval.declined).to(sender, sender));
        }
        self.outbox.enqueue_all(notices);
        Ok(approval)
    }

    /// Remove a pending request. Admins decline it; with self-service on, the
    /// owner may withdraw it.
    pub async fn decline(&self, caller: &Identity, id: Ulid) -> Result<Booking, EngineError> {
        let result = self.remove(caller, id, BookingStatus::Pending).await;
        record("decline", &result);
        result
    }

    /// Remove an approved booking. Admins cancel it; with self-service on,
    /// the owner may withdraw it.
    pub async fn cancel(&self, caller: &Identity, id: Ulid) -> Result<Booking, EngineError> {
        let result = self.remove(caller, id, BookingStatus::Approved).await;
        record("cancel", &result);
        result
    }

    async fn remove(&self, caller: &Identity, id: Ulid, expected: BookingStatus) -> Result<Booking, EngineError> {
        let booking = self.engine.get_booking(id).await?;
        let as_admin = self.policy.is_admin_for(caller, booking.floor);
        let as_owner = self.self_service && booking.is_owned_by(&caller.user_id);

        let reason = match (as_admin, as_owner, expected) {
            (true, _, BookingStatus::Pending) => RemovalReason::Declined,
            (true, _, BookingStatus::Approved) => RemovalReason::Cancelled,
            (false, true, _) => RemovalReason::Withdrawn,
            (false, false, _) => {
                return Err(EngineError::Forbidden("only an admin or the owner can remove this booking"));
            }
        };

        let removed = self.engine.remove(id, expected, reason).await?;
        let sender = caller.user_id.as_str();
        let notices = match reason {
            RemovalReason::Declined => vec![
                messages::declined(&removed).to(&removed.requester.user_id, sender),
                messages::removed_admin(&removed, "Declined").to(sender, sender),
            ],
            RemovalReason::Cancelled => vec![
                messages::cancelled(&removed).to(&removed.requester.user_id, sender),
                messages::removed_admin(&removed, "Cancelled").to(sender, sender),
            ],
            RemovalReason::Withdrawn => {
                let mail = messages::withdrawn(&removed, self.portal_url.as_deref());
                self.admin_notices(removed.floor, &mail, sender)
            }
        };
        self.outbox.enqueue_all(notices);
        Ok(removed)
    }
}
