use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::catalog::{self, FloorCatalog};
use crate::engine::Decision;
use crate::identity::{AdminPolicy, Identity};
use crate::lifecycle::Draft;
use crate::model::{Booking, Candidate, Floor, Ms};

use super::{ApiError, AppState, Caller};

pub async fn health() -> &'static str {
    "ok"
}

pub async fn floors() -> Json<&'static [FloorCatalog]> {
    Json(catalog::FLOORS)
}

/// Contact details are only shown to the floor's admins and the owner.
pub(super) fn redact(mut bookings: Vec<Booking>, caller: &Identity, policy: &AdminPolicy) -> Vec<Booking> {
    for b in &mut bookings {
        if !policy.is_admin_for(caller, b.floor) && !b.is_owned_by(&caller.user_id) {
            b.requester.phone = None;
            b.requester.cpr = None;
        }
    }
    bookings
}

pub async fn snapshot(
    State(state): State<AppState>,
    caller: Caller,
    Path(floor): Path<u8>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state.lifecycle.engine().snapshot(Floor(floor)).await?;
    Ok(Json(redact(bookings, caller.identity(), state.lifecycle.policy())))
}

#[derive(Deserialize)]
pub struct Slot {
    room: String,
    start: Ms,
    end: Ms,
}

pub async fn evaluate(
    State(state): State<AppState>,
    _caller: Caller,
    Path(floor): Path<u8>,
    Json(slot): Json<Slot>,
) -> Result<Json<Decision>, ApiError> {
    let candidate = Candidate {
        floor: Floor(floor),
        room: slot.room,
        start: slot.start,
        end: slot.end,
    };
    let decision = state.lifecycle.engine().evaluate_candidate(&candidate).await?;
    Ok(Json(decision))
}

pub async fn submit(
    State(state): State<AppState>,
    caller: Caller,
    Path(floor): Path<u8>,
    Json(draft): Json<Draft>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = state.lifecycle.submit(caller.identity(), Floor(floor), draft).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    booking: Booking,
    declined: Vec<Ulid>,
    already_approved: bool,
}

pub async fn approve(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Ulid>,
) -> Result<Json<ApprovalView>, ApiError> {
    let approval = state.lifecycle.approve(caller.identity(), id).await?;
    Ok(Json(ApprovalView {
        declined: approval.declined.iter().map(|b| b.id).collect(),
        booking: approval.booking,
        already_approved: approval.already_approved,
    }))
}

pub async fn decline(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Ulid>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.lifecycle.decline(caller.identity(), id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Ulid>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.lifecycle.cancel(caller.identity(), id).await?))
}
