use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::limits::LIVE_CHANNEL_CAPACITY;
use crate::model::{Booking, Floor};

/// The full, start-ordered booking list of one floor at one point in time.
pub type Snapshot = Arc<Vec<Booking>>;

/// Broadcast hub for live floor snapshots. Every committed change on a floor
/// publishes that floor's new snapshot to its subscribers.
pub struct LiveHub {
    channels: DashMap<Floor, broadcast::Sender<Snapshot>>,
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a floor. Creates the channel if needed.
    pub fn subscribe(&self, floor: Floor) -> broadcast::Receiver<Snapshot> {
        let sender = self
            .channels
            .entry(floor)
            .or_insert_with(|| broadcast::channel(LIVE_CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Whether anyone is listening. Lets writers skip building a snapshot.
    pub fn is_watched(&self, floor: Floor) -> bool {
        self.channels
            .get(&floor)
            .is_some_and(|s| s.receiver_count() > 0)
    }

    /// No-op if nobody is listening.
    pub fn publish(&self, floor: Floor, snapshot: Snapshot) {
        if let Some(sender) = self.channels.get(&floor) {
            let _ = sender.send(snapshot);
        }
    }
}
