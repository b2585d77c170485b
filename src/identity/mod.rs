//! Who the caller is and what they may do.
//!
//! Authentication is delegated to an [`IdentityProvider`] chosen at startup
//! (password exchange against a directory service, or a federated bearer
//! token plus profile fetch). Authorization is a separate, pure
//! [`AdminPolicy`] built from configuration.

mod directory;
mod federated;
mod session;
mod token;

pub use directory::DirectoryProvider;
pub use federated::FederatedProvider;
pub use session::{Session, Sessions};
pub use token::{BearerToken, TokenError, TokenRefresher};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Floor;

/// An authenticated person. `user_id` is their email address and is the key
/// for ownership checks, profiles and admin membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub department: String,
    pub phone: Option<String>,
}

impl Identity {
    pub fn is(&self, user_id: &str) -> bool {
        self.user_id.eq_ignore_ascii_case(user_id)
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("sign-in rejected: {0}")]
    Rejected(String),
    #[error("{0} sign-in is not available")]
    Unsupported(&'static str),
    #[error("identity service unavailable: {0}")]
    Upstream(String),
}

/// What a client presents to sign in. Which shape is accepted depends on the
/// configured provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    #[serde(rename_all = "camelCase")]
    Bearer {
        access_token: String,
        refresh_token: Option<String>,
        /// Seconds until `access_token` expires.
        expires_in: Option<i64>,
    },
    Password { username: String, password: String },
}

/// A successful sign-in. Federated sign-ins also carry the bearer token that
/// mail is later sent with.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub identity: Identity,
    pub token: Option<BearerToken>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn login(&self, credentials: Credentials) -> Result<SignIn, IdentityError>;

    /// Provider-side sign-out. Most providers keep no server state.
    async fn logout(&self, _identity: &Identity) {}
}

#[derive(Debug, Clone)]
struct AdminEntry {
    email: String,
    /// Empty means every floor.
    floors: Vec<Floor>,
}

/// The admin allow-list: a pure lookup from identity to privilege, built once
/// from configuration and shared by every privileged transition.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    admins: Vec<AdminEntry>,
}

impl AdminPolicy {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<Floor>)>,
    {
        let admins = entries
            .into_iter()
            .map(|(email, floors)| AdminEntry {
                email: email.trim().to_ascii_lowercase(),
                floors,
            })
            .filter(|e| !e.email.is_empty())
            .collect();
        Self { admins }
    }

    fn entry(&self, identity: &Identity) -> Option<&AdminEntry> {
        self.admins.iter().find(|a| identity.is(&a.email))
    }

    /// Admin on at least one floor.
    pub fn is_admin(&self, identity: &Identity) -> bool {
        self.entry(identity).is_some()
    }

    pub fn is_admin_for(&self, identity: &Identity, floor: Floor) -> bool {
        self.entry(identity)
            .is_some_and(|a| a.floors.is_empty() || a.floors.contains(&floor))
    }

    /// Addresses to notify about activity on `floor`.
    pub fn admins_for(&self, floor: Floor) -> Vec<String> {
        self.admins
            .iter()
            .filter(|a| a.floors.is_empty() || a.floors.contains(&floor))
            .map(|a| a.email.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn identity(user: &str) -> Identity {
    Identity {
        user_id: format!("{user}@example.org"),
        display_name: user.to_string(),
        department: "Planning".into(),
        phone: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AdminPolicy {
        AdminPolicy::new([
            ("Head@Example.org".to_string(), vec![]),
            ("seven@example.org".to_string(), vec![Floor(7)]),
        ])
    }

    #[test]
    fn admin_lookup_ignores_case() {
        let p = policy();
        assert!(p.is_admin(&identity("head")));
        assert!(p.is_admin(&identity("seven")));
        assert!(!p.is_admin(&identity("amal")));
    }

    #[test]
    fn floor_scoped_admins() {
        let p = policy();
        assert!(p.is_admin_for(&identity("head"), Floor(10)));
        assert!(p.is_admin_for(&identity("seven"), Floor(7)));
        assert!(!p.is_admin_for(&identity("seven"), Floor(10)));

        assert_eq!(p.admins_for(Floor(10)), vec!["head@example.org"]);
        assert_eq!(p.admins_for(Floor(7)).len(), 2);
    }

    #[test]
    fn blank_entries_are_dropped() {
        let p = AdminPolicy::new([(" ".to_string(), vec![])]);
        assert!(p.is_empty());
    }

    #[test]
    fn credentials_accept_both_shapes() {
        let pw: Credentials =
            serde_json::from_str(r#"{"username":"amal","password":"pw"}"#).unwrap();
        assert!(matches!(pw, Credentials::Password { .. }));

        let bearer: Credentials =
            serde_json::from_str(r#"{"accessToken":"abc","expiresIn":3600}"#).unwrap();
        assert!(matches!(
            bearer,
            Credentials::Bearer { expires_in: Some(3600), refresh_token: None, .. }
        ));
    }
}
