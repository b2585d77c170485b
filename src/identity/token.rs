use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Lifetime assumed when the issuer doesn't say.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Longest lifetime believed. `expires_in` arrives from clients and issuers.
const MAX_LIFETIME_SECS: i64 = 90 * 24 * 3600;

/// A delegated credential for sending mail as a signed-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

// Keep secrets out of logs.
impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("refreshable", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl BearerToken {
    pub fn issued(access_token: String, refresh_token: Option<String>, expires_in: Option<i64>) -> Self {
        let lifetime = expires_in
            .unwrap_or(DEFAULT_LIFETIME_SECS)
            .clamp(0, MAX_LIFETIME_SECS);
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) < self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("silent refresh failed: {0}")]
    Refresh(String),
    #[error("no fresh token was supplied within {0} seconds")]
    InteractiveTimeout(u64),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Silent refresh: trades a refresh token for a new access token at the
/// issuer's token endpoint.
#[derive(Clone, Debug)]
pub struct TokenRefresher {
    http: Client,
    token_url: String,
    client_id: String,
}

impl TokenRefresher {
    pub fn new(http: Client, token_url: String, client_id: String) -> Self {
        Self {
            http,
            token_url,
            client_id,
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<BearerToken, TokenError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| TokenError::Refresh(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::debug!("token endpoint answered {status}: {body}");
            return Err(TokenError::Refresh(format!("token endpoint returned {status}")));
        }

        let grant: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Refresh(e.to_string()))?;
        // Issuers may omit the refresh token when it is unchanged.
        let refresh_token = grant.refresh_token.or_else(|| Some(refresh_token.to_string()));
        Ok(BearerToken::issued(grant.access_token, refresh_token, grant.expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_uses_skew() {
        let now = Utc::now();
        let mut t = BearerToken::issued("a".into(), None, Some(3600));
        assert!(t.is_fresh(now));

        t.expires_at = now + Duration::seconds(30);
        assert!(!t.is_fresh(now));

        t.expires_at = now - Duration::seconds(1);
        assert!(!t.is_fresh(now));
    }

    #[test]
    fn out_of_range_lifetimes_are_clamped() {
        let now = Utc::now();
        let long = BearerToken::issued("a".into(), None, Some(i64::MAX));
        assert!(long.is_fresh(now));
        assert!(long.expires_at <= Utc::now() + Duration::seconds(MAX_LIFETIME_SECS));

        let negative = BearerToken::issued("a".into(), None, Some(i64::MIN));
        assert!(!negative.is_fresh(now));
    }

    #[test]
    fn debug_hides_secrets() {
        let t = BearerToken::issued("secret-access".into(), Some("secret-refresh".into()), None);
        let shown = format!("{t:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("refreshable: true"));
    }
}
