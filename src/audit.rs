use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Booking, Floor, Ms};

/// Row appended to the external booking ledger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LedgerRow {
    name: String,
    cpr: Option<String>,
    phone: Option<String>,
    department: String,
    room: String,
    floor: Floor,
    start: String,
    end: String,
    user_id: String,
}

fn iso(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

impl From<&Booking> for LedgerRow {
    fn from(b: &Booking) -> Self {
        Self {
            name: b.requester.name.clone(),
            cpr: b.requester.cpr.clone(),
            phone: b.requester.phone.clone(),
            department: b.requester.department.clone(),
            room: b.room.clone(),
            floor: b.floor,
            start: iso(b.start),
            end: iso(b.end),
            user_id: b.requester.user_id.clone(),
        }
    }
}

/// Optional spreadsheet ledger. Writes are detached; failures are logged and
/// never reach the booking flow.
#[derive(Clone, Debug)]
pub struct AuditLedger {
    http: Client,
    endpoint: String,
}

impl AuditLedger {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/add-booking", base_url.trim_end_matches('/')),
        }
    }

    pub fn record(&self, booking: &Booking) {
        let row = LedgerRow::from(booking);
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let id = booking.id;
        tokio::spawn(async move {
            match http.post(&endpoint).json(&row).send().await {
                Ok(r) if r.status().is_success() => debug!("ledger row written for {id}"),
                Ok(r) => warn!("ledger rejected booking {id}: {}", r.status()),
                Err(e) => warn!("ledger unreachable for booking {id}: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BookingStatus;
    use crate::model::fixtures::*;

    #[test]
    fn row_carries_contact_fields_and_iso_times() {
        let b = booking("Room2", 1_893_492_000_000, 1_893_495_600_000, BookingStatus::Pending);
        let row = serde_json::to_value(LedgerRow::from(&b)).unwrap();
        assert_eq!(row["userId"], "someone@example.org");
        assert_eq!(row["cpr"], "900101234");
        assert_eq!(row["floor"], 10);
        assert_eq!(row["start"], "2030-01-01T10:00:00+00:00");
    }
}
