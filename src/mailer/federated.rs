use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::identity::{Sessions, TokenError, TokenRefresher};

use super::relay::post_send_email;
use super::{Delivery, MailTransport, Notice};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FederatedRequest<'a> {
    to: &'a str,
    subject: &'a str,
    message: &'a str,
    access_token: &'a str,
}

/// Sends as the signed-in sender through the mail API, using the bearer
/// token held for them in [`Sessions`].
///
/// An expired token is first refreshed silently with its refresh token. If
/// that is impossible the sender's sessions are flagged for an interactive
/// refresh and the send waits, up to `interactive_wait`, for the client to
/// push a new token. Giving up fails only this notice, and for one more
/// `interactive_wait` the sender's other queued notices fail without
/// waiting again.
pub struct FederatedTransport {
    http: Client,
    endpoint: String,
    sessions: Arc<Sessions>,
    refresher: Option<TokenRefresher>,
    interactive_wait: Duration,
    /// When each sender's last interactive wait timed out.
    gave_up: DashMap<String, Instant>,
}

impl FederatedTransport {
    pub fn new(
        http: Client,
        base_url: &str,
        sessions: Arc<Sessions>,
        refresher: Option<TokenRefresher>,
        interactive_wait: Duration,
    ) -> Self {
        Self {
            http,
            endpoint: format!("{}/send-email", base_url.trim_end_matches('/')),
            sessions,
            refresher,
            interactive_wait,
            gave_up: DashMap::new(),
        }
    }

    async fn access_token(&self, user: &str) -> Result<String, TokenError> {
        let current = self.sessions.token(user);
        if let Some(token) = &current
            && token.is_fresh(Utc::now())
        {
            return Ok(token.access_token.clone());
        }

        let refresh_token = current.and_then(|t| t.refresh_token);
        if let (Some(refresher), Some(refresh_token)) = (&self.refresher, refresh_token) {
            match refresher.refresh(&refresh_token).await {
                Ok(fresh) => {
                    let access = fresh.access_token.clone();
                    self.sessions.store_token(user, fresh);
                    debug!("silently refreshed token for {user}");
                    return Ok(access);
                }
                Err(e) => debug!("silent refresh for {user} failed: {e}"),
            }
        }

        let key = user.trim().to_ascii_lowercase();
        let recently_gave_up = self
            .gave_up
            .get(&key)
            .is_some_and(|at| at.elapsed() < self.interactive_wait);
        if recently_gave_up {
            return Err(TokenError::InteractiveTimeout(self.interactive_wait.as_secs()));
        }

        let result = self.wait_for_interactive(user).await;
        match &result {
            Ok(_) => {
                self.gave_up.remove(&key);
            }
            Err(_) => {
                self.gave_up.insert(key, Instant::now());
            }
        }
        result
    }

    async fn wait_for_interactive(&self, user: &str) -> Result<String, TokenError> {
        let mut rx = self.sessions.request_refresh(user);
        info!("waiting for {user} to sign in again");
        let pushed = tokio::time::timeout(self.interactive_wait, async {
            while rx.changed().await.is_ok() {
                let latest = rx.borrow_and_update().clone();
                if let Some(token) = latest
                    && token.is_fresh(Utc::now())
                {
                    return Some(token.access_token);
                }
            }
            None
        })
        .await;

        match pushed {
            Ok(Some(access)) => Ok(access),
            _ => Err(TokenError::InteractiveTimeout(self.interactive_wait.as_secs())),
        }
    }
}

#[async_trait]
impl MailTransport for FederatedTransport {
    fn name(&self) -> &'static str {
        "federated"
    }

    async fn send(&self, notice: &Notice) -> Delivery {
        let access_token = match self.access_token(&notice.sender).await {
            Ok(t) => t,
            Err(e) => return Delivery::failed(e.to_string()),
        };
        let body = FederatedRequest {
            to: &notice.to,
            subject: &notice.subject,
            message: &notice.body,
            access_token: &access_token,
        };
        post_send_email(&self.http, &self.endpoint, &body).await
    }
}
