/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use rusqlite::Connection;

use crate::error::Result;

const VERSION: i64 = 1;

const CREATE_TABLES_SQL: &str = "
CREATE TABLE IF NOT EXISTS notification_record (
    record_key          TEXT     NOT NULL PRIMARY KEY,
    notification_id     TEXT     NOT NULL,
    title               TEXT     NOT NULL,
    body                TEXT     NOT NULL,
    extended_property   TEXT,
    clicked             TINYINT  NOT NULL DEFAULT 0,
    received_at         INTEGER  NOT NULL,
    event_log_sent      TINYINT  NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS meta_data (
    key                 TEXT     NOT NULL PRIMARY KEY,
    value               TEXT     NOT NULL
);
";

pub const NOTIFICATION_COLS: &str = "
    notification_id,
    title,
    body,
    extended_property,
    clicked,
    received_at,
    event_log_sent
";

/// Declare the schema lazily on first open.
pub fn init(db: &Connection) -> Result<()> {
    let user_version: i64 = db.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if user_version == 0 {
        create(db)?;
    } else if user_version != VERSION {
        if user_version < VERSION {
            upgrade(db, user_version)?;
        } else {
            log::warn!(
                "Loaded future schema version {} (we only understand version {}). \
                 Optimistically ",
                user_version,
                VERSION
            )
        }
    }
    Ok(())
}

fn upgrade(_db: &Connection, from: i64) -> Result<()> {
    log::debug!("Upgrading schema from {} to {}", from, VERSION);
    if from == VERSION {
        return Ok(());
    }
    panic!("sorry, no upgrades yet - delete your db!");
}

pub fn create(db: &Connection) -> Result<()> {
    log::debug!("Creating schema");
    db.execute_batch(CREATE_TABLES_SQL)?;
    db.pragma_update(None, "user_version", VERSION)?;
    Ok(())
}
