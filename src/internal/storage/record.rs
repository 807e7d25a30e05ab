/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Row;

/// The single durable record describing the most recently received
/// notification. Receiving a new notification overwrites it
/// unconditionally; there is no history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationRecord {
    /// Notification id assigned by the service.
    pub notification_id: String,

    /// Displayed title.
    pub title: String,

    /// Displayed body text.
    pub body: String,

    /// Extended property attached to the notification, if any.
    pub extended_property: Option<String>,

    /// Whether the user clicked/tapped the displayed notification.
    pub clicked: bool,

    /// When the notification arrived, in epoch seconds.
    pub received_at: u64,

    /// Whether the launch event log for this notification has been
    /// reported to the server.
    pub event_log_sent: bool,
}

impl NotificationRecord {
    /// A freshly received, not-yet-reported notification.
    pub fn new(notification_id: &str, title: &str, body: &str) -> Self {
        Self {
            notification_id: notification_id.to_owned(),
            title: title.to_owned(),
            body: body.to_owned(),
            extended_property: None,
            clicked: false,
            received_at: now_secs(),
            event_log_sent: false,
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(NotificationRecord {
            notification_id: row.get("notification_id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            extended_property: row.get("extended_property")?,
            clicked: row.get("clicked")?,
            received_at: row.get("received_at")?,
            event_log_sent: row.get("event_log_sent")?,
        })
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Current date before unix epoch.")
        .as_secs()
}
