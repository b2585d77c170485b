use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Credentials, Identity, IdentityError, IdentityProvider, SignIn};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    success: bool,
    user: Option<DirectoryUser>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct DirectoryUser {
    email: String,
    name: Option<String>,
    department: Option<String>,
    phone: Option<String>,
}

/// Username/password exchange against the organisation's directory bridge:
/// `POST {base}/login` with `{username, password}` answering
/// `{success, user: {email, name, department}}`.
#[derive(Clone, Debug)]
pub struct DirectoryProvider {
    http: Client,
    base_url: String,
}

impl DirectoryProvider {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for DirectoryProvider {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn login(&self, credentials: Credentials) -> Result<SignIn, IdentityError> {
        let Credentials::Password { username, password } = credentials else {
            return Err(IdentityError::Unsupported("bearer token"));
        };
        if username.trim().is_empty() || password.is_empty() {
            return Err(IdentityError::Rejected("username and password are required".into()));
        }

        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&LoginRequest {
                username: username.trim(),
                password: &password,
            })
            .send()
            .await
            .map_err(|e| IdentityError::Upstream(e.to_string()))?;

        if response.status().is_server_error() {
            warn!("directory login answered {}", response.status());
            return Err(IdentityError::Upstream(format!("directory returned {}", response.status())));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Upstream(e.to_string()))?;

        match body {
            LoginResponse {
                success: true,
                user: Some(user),
                ..
            } => {
                let display_name = user.name.unwrap_or_else(|| user.email.clone());
                Ok(SignIn {
                    identity: Identity {
                        user_id: user.email.trim().to_ascii_lowercase(),
                        display_name,
                        department: user.department.unwrap_or_default(),
                        phone: user.phone,
                    },
                    token: None,
                })
            }
            LoginResponse { message, .. } => Err(IdentityError::Rejected(
                message.unwrap_or_else(|| "invalid credentials".into()),
            )),
        }
    }
}
