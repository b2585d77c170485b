//! Service configuration, read once from `ROOMBOOK_*` environment variables.
//! Every key has a default so the service starts with an empty environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::limits::DEFAULT_OUTBOX_CAPACITY;
use crate::model::Floor;

#[derive(Debug, Error)]
#[error("{key}={value:?}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    Directory,
    Federated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailMode {
    Relay,
    Federated,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// `(email, floors)`; an empty floor list means every floor.
    pub admins: Vec<(String, Vec<Floor>)>,
    /// Owners may withdraw their own requests and cancel their own bookings.
    pub self_service: bool,
    pub identity: IdentityMode,
    pub directory_url: String,
    pub profile_url: String,
    pub mail: MailMode,
    pub mail_url: String,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub token_wait: Duration,
    pub audit_url: Option<String>,
    pub portal_url: Option<String>,
    pub outbox_capacity: usize,
    pub session_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let identity = match get("ROOMBOOK_IDENTITY").as_deref() {
            None | Some("directory") => IdentityMode::Directory,
            Some("federated") => IdentityMode::Federated,
            Some(other) => return Err(invalid("ROOMBOOK_IDENTITY", other, "expected directory or federated")),
        };
        let mail = match get("ROOMBOOK_MAIL").as_deref() {
            None | Some("relay") => MailMode::Relay,
            Some("federated") => MailMode::Federated,
            Some("disabled") => MailMode::Disabled,
            Some(other) => return Err(invalid("ROOMBOOK_MAIL", other, "expected relay, federated or disabled")),
        };
        // Federated mail sends with the sender's bearer token, which only
        // federated sign-in ever stores.
        if mail == MailMode::Federated && identity != IdentityMode::Federated {
            return Err(invalid("ROOMBOOK_MAIL", "federated", "federated mail requires ROOMBOOK_IDENTITY=federated"));
        }

        Ok(Self {
            bind: get("ROOMBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "ROOMBOOK_PORT", 5000)?,
            data_dir: PathBuf::from(get("ROOMBOOK_DATA_DIR").unwrap_or_else(|| "./data".into())),
            compact_threshold: parse_or(&get, "ROOMBOOK_COMPACT_THRESHOLD", 1000)?,
            metrics_port: get("ROOMBOOK_METRICS_PORT")
                .map(|v| v.parse().map_err(|_| invalid("ROOMBOOK_METRICS_PORT", &v, "not a port")))
                .transpose()?,
            admins: parse_admins(get("ROOMBOOK_ADMINS").as_deref().unwrap_or(""))?,
            self_service: parse_flag(&get, "ROOMBOOK_SELF_SERVICE")?,
            identity,
            directory_url: get("ROOMBOOK_DIRECTORY_URL").unwrap_or_else(|| "http://localhost:5000".into()),
            profile_url: get("ROOMBOOK_PROFILE_URL")
                .unwrap_or_else(|| "https://graph.microsoft.com/v1.0/me".into()),
            mail,
            mail_url: get("ROOMBOOK_MAIL_URL").unwrap_or_else(|| "http://localhost:5000".into()),
            token_url: get("ROOMBOOK_TOKEN_URL"),
            client_id: get("ROOMBOOK_CLIENT_ID"),
            token_wait: Duration::from_secs(parse_or(&get, "ROOMBOOK_TOKEN_WAIT_SECS", 120)?),
            audit_url: get("ROOMBOOK_AUDIT_URL"),
            portal_url: get("ROOMBOOK_PORTAL_URL"),
            outbox_capacity: parse_or(&get, "ROOMBOOK_OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY)?,
            session_ttl_secs: parse_or(&get, "ROOMBOOK_SESSION_TTL_SECS", 12 * 3600)?,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

fn invalid(key: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError {
        key,
        value: value.to_string(),
        reason,
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| invalid(key, &v, "not a number")),
    }
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(invalid(key, other, "expected true or false")),
    }
}

/// `email[:floor,floor];email...`
fn parse_admins(spec: &str) -> Result<Vec<(String, Vec<Floor>)>, ConfigError> {
    let mut admins = Vec::new();
    for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (email, floors) = match entry.split_once(':') {
            Some((email, floors)) => (email.trim(), floors),
            None => (entry, ""),
        };
        if !email.contains('@') {
            return Err(invalid("ROOMBOOK_ADMINS", entry, "admin must be an email address"));
        }
        let floors = floors
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| {
                f.parse::<u8>()
                    .map(Floor)
                    .map_err(|_| invalid("ROOMBOOK_ADMINS", entry, "floor must be a number"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        admins.push((email.to_ascii_lowercase(), floors));
    }
    Ok(admins)
}
