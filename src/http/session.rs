use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::identity::{BearerToken, Credentials, Identity, Session};
use crate::model::UserProfile;

use super::{ApiError, AppState};

/// An authenticated request. The session token travels as
/// `Authorization: Bearer <token>`; browsers can't set headers on a
/// WebSocket upgrade, so `?token=` is accepted as well.
pub struct Caller {
    pub token: String,
    pub session: Session,
}

impl Caller {
    pub fn identity(&self) -> &Identity {
        &self.session.identity
    }
}

fn session_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    from_header.or_else(|| {
        parts.uri.query().and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("token="))
                .map(str::to_string)
        })
    })
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or(ApiError::Unauthenticated)?;
        let session = state.sessions.get(&token).ok_or(ApiError::Unauthenticated)?;
        Ok(Caller { token, session })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    token: String,
    identity: Identity,
    is_admin: bool,
    profile: Option<UserProfile>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let sign_in = state.identity.login(credentials).await?;
    let identity = sign_in.identity;
    let is_admin = state.lifecycle.policy().is_admin(&identity);
    let profile = state.lifecycle.engine().profile(&identity.user_id);
    let token = state.sessions.open(identity.clone(), is_admin, sign_in.token);
    info!(
        "{} signed in via {} (admin: {is_admin})",
        identity.user_id,
        state.identity.name()
    );
    Ok(Json(LoginResponse {
        token,
        identity,
        is_admin,
        profile,
    }))
}

pub async fn logout(State(state): State<AppState>, caller: Caller) -> StatusCode {
    state.sessions.close(&caller.token);
    state.identity.logout(caller.identity()).await;
    StatusCode::NO_CONTENT
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    identity: Identity,
    is_admin: bool,
    profile: Option<UserProfile>,
    token_refresh_requested: bool,
}

pub async fn get_session(State(state): State<AppState>, caller: Caller) -> Json<SessionView> {
    let user_id = &caller.session.identity.user_id;
    Json(SessionView {
        profile: state.lifecycle.engine().profile(user_id),
        token_refresh_requested: state.sessions.refresh_requested(user_id),
        identity: caller.session.identity.clone(),
        is_admin: caller.session.is_admin,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPush {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// The client answers an interactive refresh request here.
pub async fn put_token(
    State(state): State<AppState>,
    caller: Caller,
    Json(push): Json<TokenPush>,
) -> StatusCode {
    let bearer = BearerToken::issued(push.access_token, push.refresh_token, push.expires_in);
    state.sessions.store_token(&caller.identity().user_id, bearer);
    StatusCode::NO_CONTENT
}
