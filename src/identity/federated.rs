use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{BearerToken, Credentials, Identity, IdentityError, IdentityProvider, SignIn};

/// Profile as returned by the identity platform's `/me` endpoint.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    mail: Option<String>,
    user_principal_name: Option<String>,
    display_name: Option<String>,
    department: Option<String>,
    mobile_phone: Option<String>,
}

/// Federated sign-in: the client completes the provider's popup or silent
/// flow and hands over the bearer token; we resolve it to a profile.
#[derive(Clone, Debug)]
pub struct FederatedProvider {
    http: Client,
    profile_url: String,
}

impl FederatedProvider {
    pub fn new(http: Client, profile_url: impl Into<String>) -> Self {
        Self {
            http,
            profile_url: profile_url.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FederatedProvider {
    fn name(&self) -> &'static str {
        "federated"
    }

    async fn login(&self, credentials: Credentials) -> Result<SignIn, IdentityError> {
        let Credentials::Bearer {
            access_token,
            refresh_token,
            expires_in,
        } = credentials
        else {
            return Err(IdentityError::Unsupported("password"));
        };

        let response = self
            .http
            .get(&self.profile_url)
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Upstream(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(IdentityError::Rejected("token not accepted".into()));
            }
            s => return Err(IdentityError::Upstream(format!("profile endpoint returned {s}"))),
        }

        let profile: Profile = response
            .json()
            .await
            .map_err(|e| IdentityError::Upstream(e.to_string()))?;
        let email = profile
            .mail
            .or(profile.user_principal_name)
            .ok_or_else(|| IdentityError::Rejected("profile has no email address".into()))?;

        Ok(SignIn {
            identity: Identity {
                user_id: email.trim().to_ascii_lowercase(),
                display_name: profile.display_name.unwrap_or_else(|| email.clone()),
                department: profile.department.unwrap_or_default(),
                phone: profile.mobile_phone,
            },
            token: Some(BearerToken::issued(access_token, refresh_token, expires_in)),
        })
    }
}
