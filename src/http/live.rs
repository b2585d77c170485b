use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::identity::Identity;
use crate::model::{Booking, Floor};
use crate::observability;

use super::handlers::redact;
use super::{ApiError, AppState, Caller};

/// Live view of one floor: the full snapshot on connect and again after
/// every committed change. Clients never receive diffs.
pub async fn live(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    caller: Caller,
    Path(floor): Path<u8>,
) -> Result<Response, ApiError> {
    let floor = Floor(floor);
    // Unknown floors fail before the upgrade.
    state.lifecycle.engine().snapshot(floor).await?;
    let identity = caller.session.identity;
    Ok(ws.on_upgrade(move |socket| watch_floor(socket, state, floor, identity)))
}

fn frame(bookings: Vec<Booking>, identity: &Identity, state: &AppState) -> Message {
    let visible = redact(bookings, identity, state.lifecycle.policy());
    Message::Text(serde_json::to_string(&visible).unwrap_or_else(|_| "[]".into()).into())
}

async fn watch_floor(socket: WebSocket, state: AppState, floor: Floor, identity: Identity) {
    let engine = state.lifecycle.engine().clone();
    // Subscribe before reading so no change slips between the two.
    let mut updates = engine.live.subscribe(floor);
    let (mut tx, mut rx) = socket.split();

    metrics::gauge!(observability::LIVE_SUBSCRIBERS).increment(1.0);
    debug!("{} watching floor {floor}", identity.user_id);

    if let Ok(bookings) = engine.snapshot(floor).await
        && tx.send(frame(bookings, &identity, &state)).await.is_ok()
    {
        loop {
            let next = tokio::select! {
                update = updates.recv() => match update {
                    Ok(snapshot) => snapshot.as_ref().clone(),
                    // Missed some; the current state supersedes them all.
                    Err(RecvError::Lagged(_)) => match engine.snapshot(floor).await {
                        Ok(bookings) => bookings,
                        Err(_) => break,
                    },
                    Err(RecvError::Closed) => break,
                },
                incoming = rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                },
            };
            if tx.send(frame(next, &identity, &state)).await.is_err() {
                break;
            }
        }
    }

    metrics::gauge!(observability::LIVE_SUBSCRIBERS).decrement(1.0);
    debug!("{} stopped watching floor {floor}", identity.user_id);
}
