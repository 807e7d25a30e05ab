/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Handles the client's persisted state
//!
//! Mainly exposes a trait, [`Storage`] and a concrete type that implements the trait, [`Store`]
//!
//! Two things survive page reloads here: the single bearer-token slot and
//! the single [`NotificationRecord`] describing the most recently
//! received notification. Both are globally addressed, last-write-wins
//! slots; neither holds history.

mod db;
mod record;
mod schema;

pub use self::{
    db::{PushDb as Store, Storage},
    record::NotificationRecord,
};

pub(crate) use self::record::now_secs;
