//! Outgoing email. Lifecycle transitions drop [`Notice`]s into the
//! [`Outbox`]; a background dispatcher hands them to the configured
//! [`MailTransport`], one at a time per sender. Nothing here can fail a
//! transition.

mod federated;
mod relay;

pub use federated::FederatedTransport;
pub use relay::RelayTransport;

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::observability;

/// One email to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// The identity the mail is sent on behalf of.
    pub sender: String,
}

/// Outcome of a single send, in the mail service's own response shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Delivery {
    pub fn sent() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// A way of getting mail out. Implementations report every failure in the
/// returned [`Delivery`] and never panic or return early.
#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notice: &Notice) -> Delivery;
}

/// Handle for queueing notices. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: Option<mpsc::Sender<Notice>>,
}

impl Outbox {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// An outbox that discards everything (mail disabled).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue without waiting. A full or closed queue drops the notice.
    pub fn enqueue(&self, notice: Notice) {
        let Some(tx) = &self.tx else {
            debug!("mail disabled, dropping \"{}\" to {}", notice.subject, notice.to);
            return;
        };
        match tx.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!("outbox full, dropping \"{}\" to {}", n.subject, n.to);
                metrics::counter!(observability::OUTBOX_DROPPED_TOTAL).increment(1);
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                warn!("mail dispatcher stopped, dropping \"{}\" to {}", n.subject, n.to);
                metrics::counter!(observability::OUTBOX_DROPPED_TOTAL).increment(1);
            }
        }
    }

    pub fn enqueue_all(&self, notices: impl IntoIterator<Item = Notice>) {
        for notice in notices {
            self.enqueue(notice);
        }
    }
}

fn record(notice: &Notice, delivery: &Delivery) {
    let status = if delivery.success { "sent" } else { "failed" };
    metrics::counter!(observability::NOTIFICATIONS_TOTAL, "status" => status).increment(1);
    if delivery.success {
        debug!("mailed \"{}\" to {}", notice.subject, notice.to);
    } else {
        warn!(
            "could not mail \"{}\" to {}: {}",
            notice.subject,
            notice.to,
            delivery.error.as_deref().unwrap_or("unknown error")
        );
    }
}

/// Send one notice and hand back its lane key, even if the transport panics.
async fn deliver(transport: Arc<dyn MailTransport>, notice: Notice, lane: String) -> String {
    let delivery = AssertUnwindSafe(transport.send(&notice))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Delivery::failed("mail transport panicked"));
    record(&notice, &delivery);
    lane
}

/// Drain the outbox until every sender is gone. Each notice is attempted
/// once and independently of the others.
///
/// Notices are laned by sender: one sender's notices go out in order, one
/// at a time, while different senders proceed in parallel. A sender whose
/// transport is stuck (waiting on a token refresh) only holds up their own
/// lane.
pub async fn run_dispatcher(mut rx: mpsc::Receiver<Notice>, transport: Arc<dyn MailTransport>) {
    info!("mail dispatcher started ({})", transport.name());
    // A key is present while its lane has a send in flight.
    let mut lanes: HashMap<String, VecDeque<Notice>> = HashMap::new();
    let mut in_flight: JoinSet<String> = JoinSet::new();
    let mut open = true;

    loop {
        tokio::select! {
            next = rx.recv(), if open => match next {
                Some(notice) => {
                    let key = notice.sender.trim().to_ascii_lowercase();
                    match lanes.get_mut(&key) {
                        Some(queued) => queued.push_back(notice),
                        None => {
                            lanes.insert(key.clone(), VecDeque::new());
                            in_flight.spawn(deliver(transport.clone(), notice, key));
                        }
                    }
                }
                None => open = false,
            },
            Some(done) = in_flight.join_next() => {
                let Ok(key) = done else { continue };
                match lanes.get_mut(&key).and_then(VecDeque::pop_front) {
                    Some(next) => {
                        in_flight.spawn(deliver(transport.clone(), next, key));
                    }
                    None => {
                        lanes.remove(&key);
                    }
                }
            },
            else => break,
        }
    }
    info!("mail dispatcher stopped");
}
