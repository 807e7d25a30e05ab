/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */
use std::{ops::Deref, path::Path};

use rusqlite::{named_params, Connection, OptionalExtension};

use crate::error::{PushError, Result};

use super::{record::NotificationRecord, schema};

/// The fixed name the single notification record is stored under.
const NOTIFICATION_RECORD_KEY: &str = "last_notification";

/// The fixed meta key holding the bearer token. One slot for the whole
/// profile - deliberately not namespaced by device identity, matching the
/// original best-effort cache semantics.
const AUTH_TOKEN_META_KEY: &str = "auth_token";

pub trait Storage: Sized {
    fn open<P: AsRef<Path>>(path: P) -> Result<Self>;

    /// The most recently received notification, or `None` if nothing has
    /// been received (or it was cleared). Absence is not an error.
    fn get_notification(&self) -> Result<Option<NotificationRecord>>;

    /// Fully replace the stored notification record.
    fn put_notification(&self, record: &NotificationRecord) -> Result<()>;

    fn delete_notification(&self) -> Result<bool>;

    // The bearer-token slot gets special helpers.
    fn get_auth_token(&self) -> Result<Option<String>>;
    fn set_auth_token(&self, token: &str) -> Result<()>;
    fn delete_auth_token(&self) -> Result<()>;

    // And general purpose meta with hard-coded key names.
    fn get_meta(&self, key: &str) -> Result<Option<String>>;
    fn set_meta(&self, key: &str, value: &str) -> Result<()>;
    fn delete_meta(&self, key: &str) -> Result<()>;
}

pub struct PushDb {
    pub db: Connection,
}

impl PushDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        // By default, file open errors are StorageSqlErrors and aren't super helpful.
        // Instead, remap to StorageError and provide the path to the file that couldn't be opened.
        let db = Connection::open(path).map_err(|orig| {
            PushError::StorageError(format!(
                "Could not open database file {:?} - {}",
                &path.as_os_str(),
                orig,
            ))
        })?;
        schema::init(&db)?;
        Ok(Self { db })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        schema::init(&db)?;
        Ok(Self { db })
    }
}

impl Deref for PushDb {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        &self.db
    }
}

impl Storage for PushDb {
    fn get_notification(&self) -> Result<Option<NotificationRecord>> {
        let query = format!(
            "SELECT {cols}
             FROM notification_record WHERE record_key = :key",
            cols = schema::NOTIFICATION_COLS,
        );
        Ok(self
            .db
            .query_row(
                &query,
                named_params! { ":key": NOTIFICATION_RECORD_KEY },
                NotificationRecord::from_row,
            )
            .optional()?)
    }

    fn put_notification(&self, record: &NotificationRecord) -> Result<()> {
        log::debug!(
            "storing notification record '{}' (event log sent: {})",
            record.notification_id,
            record.event_log_sent
        );
        let query = format!(
            "INSERT OR REPLACE INTO notification_record
                 (record_key, {cols})
             VALUES
                 (:key, :notification_id, :title, :body, :extended_property,
                  :clicked, :received_at, :event_log_sent)",
            cols = schema::NOTIFICATION_COLS,
        );
        self.db.execute(
            &query,
            named_params! {
                ":key": NOTIFICATION_RECORD_KEY,
                ":notification_id": record.notification_id,
                ":title": record.title,
                ":body": record.body,
                ":extended_property": record.extended_property,
                ":clicked": record.clicked,
                ":received_at": record.received_at,
                ":event_log_sent": record.event_log_sent,
            },
        )?;
        Ok(())
    }

    fn delete_notification(&self) -> Result<bool> {
        log::debug!("deleting notification record");
        let affected_rows = self.db.execute(
            "DELETE FROM notification_record WHERE record_key = :key",
            named_params! { ":key": NOTIFICATION_RECORD_KEY },
        )?;
        Ok(affected_rows == 1)
    }

    fn get_auth_token(&self) -> Result<Option<String>> {
        self.get_meta(AUTH_TOKEN_META_KEY)
    }

    fn set_auth_token(&self, token: &str) -> Result<()> {
        self.set_meta(AUTH_TOKEN_META_KEY, token)
    }

    fn delete_auth_token(&self) -> Result<()> {
        self.delete_meta(AUTH_TOKEN_META_KEY)
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .query_row(
                "SELECT value FROM meta_data WHERE key = :key LIMIT 1",
                named_params! { ":key": key },
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO meta_data (key, value) VALUES (:k, :v)",
            named_params! { ":k": key, ":v": value },
        )?;
        Ok(())
    }

    fn delete_meta(&self, key: &str) -> Result<()> {
        self.db.execute(
            "DELETE FROM meta_data WHERE key = :key",
            named_params! { ":key": key },
        )?;
        Ok(())
    }

    #[cfg(not(test))]
    fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        PushDb::open(path)
    }

    #[cfg(test)]
    fn open<P: AsRef<Path>>(_path: P) -> Result<Self> {
        PushDb::open_in_memory()
    }
}
