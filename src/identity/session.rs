use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use ulid::Ulid;

use super::{BearerToken, Identity};

#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub is_admin: bool,
    pub expires_at: DateTime<Utc>,
}

/// Latest bearer token for one user, shared by all their sessions. The watch
/// channel lets a mail send that is waiting on an interactive refresh wake
/// up as soon as the client pushes a new token.
struct TokenSlot {
    latest: watch::Sender<Option<BearerToken>>,
    refresh_requested: bool,
}

impl TokenSlot {
    fn new() -> Self {
        Self {
            latest: watch::channel(None).0,
            refresh_requested: false,
        }
    }
}

fn user_key(user_id: &str) -> String {
    user_id.trim().to_ascii_lowercase()
}

/// In-memory session table keyed by opaque session token.
pub struct Sessions {
    sessions: DashMap<String, Session>,
    tokens: DashMap<String, TokenSlot>,
    ttl: Duration,
}

impl Sessions {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            tokens: DashMap::new(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Start a session and return its token.
    pub fn open(&self, identity: Identity, is_admin: bool, bearer: Option<BearerToken>) -> String {
        let now = Utc::now();
        self.sessions.retain(|_, s| s.expires_at > now);
        self.prune_tokens();

        if let Some(bearer) = bearer {
            self.store_token(&identity.user_id, bearer);
        }
        let token = Ulid::new().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                identity,
                is_admin,
                expires_at: now + self.ttl,
            },
        );
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.get(token)?.value().clone();
        if session.expires_at <= Utc::now() {
            self.sessions.remove(token);
            return None;
        }
        Some(session)
    }

    /// End a session. Signing out of the last one also forgets the user's
    /// bearer token, so no more mail goes out in their name.
    pub fn close(&self, token: &str) -> Option<Session> {
        let (_, session) = self.sessions.remove(token)?;
        let user = user_key(&session.identity.user_id);
        if !self.sessions.iter().any(|s| user_key(&s.identity.user_id) == user) {
            self.tokens.remove(&user);
        }
        Some(session)
    }

    /// Drop token slots of users with no live session.
    fn prune_tokens(&self) {
        let signed_in: HashSet<String> = self
            .sessions
            .iter()
            .map(|s| user_key(&s.identity.user_id))
            .collect();
        self.tokens.retain(|user, _| signed_in.contains(user));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Record a new bearer token for `user_id`, clearing any pending refresh
    /// request and waking anyone waiting on one.
    pub fn store_token(&self, user_id: &str, bearer: BearerToken) {
        let mut slot = self.tokens.entry(user_key(user_id)).or_insert_with(TokenSlot::new);
        slot.refresh_requested = false;
        slot.latest.send_replace(Some(bearer));
    }

    pub fn token(&self, user_id: &str) -> Option<BearerToken> {
        self.tokens
            .get(&user_key(user_id))
            .and_then(|slot| slot.latest.borrow().clone())
    }

    /// Flag that `user_id`'s client should obtain a fresh token. The returned
    /// receiver fires on the next `store_token`.
    pub fn request_refresh(&self, user_id: &str) -> watch::Receiver<Option<BearerToken>> {
        let mut slot = self.tokens.entry(user_key(user_id)).or_insert_with(TokenSlot::new);
        slot.refresh_requested = true;
        slot.latest.subscribe()
    }

    pub fn refresh_requested(&self, user_id: &str) -> bool {
        self.tokens
            .get(&user_key(user_id))
            .is_some_and(|slot| slot.refresh_requested)
    }
}
