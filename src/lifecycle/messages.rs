use chrono::{DateTime, Utc};

use crate::catalog;
use crate::mailer::Notice;
use crate::model::{Booking, Ms};

pub(super) struct Mail {
    pub subject: String,
    pub body: String,
}

impl Mail {
    pub fn to(&self, to: &str, sender: &str) -> Notice {
        Notice {
            to: to.to_string(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            sender: sender.to_string(),
        }
    }
}

fn when(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%a %d %b %Y %H:%M UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn room_title(b: &Booking) -> &str {
    catalog::room(b.floor, &b.room).map_or(b.room.as_str(), |r| r.title)
}

fn slot_line(b: &Booking) -> String {
    format!(
        "{} on the {}, {} to {}",
        room_title(b),
        catalog::floor_label(b.floor),
        when(b.start),
        when(b.end)
    )
}

fn footer(portal: Option<&str>) -> String {
    match portal {
        Some(url) => format!("\nReview & manage bookings:\n{url}\n"),
        None => String::new(),
    }
}

pub(super) fn submitted(b: &Booking, portal: Option<&str>) -> Mail {
    let floor = catalog::floor_label(b.floor);
    let r = &b.requester;
    Mail {
        subject: format!("New Booking Request - {floor}"),
        body: format!(
            "New Booking Request (Pending)\n\n\
             Name: {}\nEmail: {}\nDepartment: {}\nPhone: {}\nRoom: {}\nStart: {}\nEnd: {}\nFloor: {floor}\n{}",
            r.name,
            r.user_id,
            r.department,
            r.phone.as_deref().unwrap_or("N/A"),
            room_title(b),
            when(b.start),
            when(b.end),
            footer(portal),
        ),
    }
}

pub(super) fn approved(b: &Booking) -> Mail {
    Mail {
        subject: "Booking Approved".into(),
        body: format!(
            "Hello {},\n\nYour booking of {} has been approved.\n",
            b.requester.name,
            slot_line(b)
        ),
    }
}

pub(super) fn approved_admin(b: &Booking, declined: usize) -> Mail {
    let cascade = match declined {
        0 => String::new(),
        1 => "\n1 overlapping request was declined automatically.\n".into(),
        n => format!("\n{n} overlapping requests were declined automatically.\n"),
    };
    Mail {
        subject: format!("Booking Approved - {}", catalog::floor_label(b.floor)),
        body: format!(
            "You approved the booking of {} for {} ({}).\n{cascade}",
            slot_line(b),
            b.requester.name,
            b.requester.user_id
        ),
    }
}

/// To the owner of a request removed because another one was approved.
pub(super) fn cascade_declined(declined: &Booking, approved: &Booking) -> Mail {
    Mail {
        subject: "Booking Declined".into(),
        body: format!(
            "Hello {},\n\nYour request for {} has been declined because the room was \
             approved for another booking from {} to {}.\n\nPlease choose another slot.\n",
            declined.requester.name,
            slot_line(declined),
            when(approved.start),
            when(approved.end)
        ),
    }
}

/// To the approving admin: one line per request the cascade removed.
pub(super) fn cascade_summary(approved: &Booking, declined: &[Booking]) -> Mail {
    let lines: String = declined
        .iter()
        .map(|d| {
            format!(
                "- {} ({}), {} to {}\n",
                d.requester.name,
                d.requester.user_id,
                when(d.start),
                when(d.end)
            )
        })
        .collect();
    Mail {
        subject: format!("Overlapping Requests Declined - {}", catalog::floor_label(approved.floor)),
        body: format!(
            "Approving {} declined these overlapping requests:\n\n{lines}",
            slot_line(approved)
        ),
    }
}

pub(super) fn declined(b: &Booking) -> Mail {
    Mail {
        subject: "Booking Declined".into(),
        body: format!(
            "Hello {},\n\nYour request for {} has been declined.\n",
            b.requester.name,
            slot_line(b)
        ),
    }
}

pub(super) fn cancelled(b: &Booking) -> Mail {
    Mail {
        subject: "Booking Cancelled".into(),
        body: format!(
            "Hello {},\n\nYour approved booking of {} has been cancelled by an administrator. \
             The room is no longer reserved for you.\n",
            b.requester.name,
            slot_line(b)
        ),
    }
}

/// Copy for the admin who declined or cancelled.
pub(super) fn removed_admin(b: &Booking, action: &str) -> Mail {
    Mail {
        subject: format!("Booking {action} - {}", catalog::floor_label(b.floor)),
        body: format!(
            "You {} the booking of {} for {} ({}).\n",
            action.to_ascii_lowercase(),
            slot_line(b),
            b.requester.name,
            b.requester.user_id
        ),
    }
}

pub(super) fn withdrawn(b: &Booking, portal: Option<&str>) -> Mail {
    Mail {
        subject: format!("Booking Withdrawn - {}", catalog::floor_label(b.floor)),
        body: format!(
            "{} ({}) withdrew their {} booking of {}.\n{}",
            b.requester.name,
            b.requester.user_id,
            b.status.as_str(),
            slot_line(b),
            footer(portal)
        ),
    }
}
