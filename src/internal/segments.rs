/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! User-segment attributes and their wire representation.
//!
//! Segments are named attributes the consuming site attaches to a device
//! for audience targeting. The server only accepts string values, so the
//! typed [`SegmentValue`]s are normalized before transmission. The
//! conversion is pure and total - every attribute in the input appears in
//! the output.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A set of user-segment attributes keyed by attribute name.
pub type SegmentSet = HashMap<String, SegmentValue>;

/// A typed segment attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum SegmentValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Timestamp(SystemTime),
}

impl SegmentValue {
    /// The canonical wire form of this value. Strings pass through,
    /// numbers and booleans render via their canonical display form, and
    /// timestamps render as the floor of epoch-seconds.
    pub fn render(&self) -> String {
        match self {
            SegmentValue::String(s) => s.clone(),
            SegmentValue::Number(n) => n.to_string(),
            SegmentValue::Boolean(b) => b.to_string(),
            SegmentValue::Timestamp(t) => t
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl From<&str> for SegmentValue {
    fn from(value: &str) -> Self {
        SegmentValue::String(value.to_owned())
    }
}

impl From<f64> for SegmentValue {
    fn from(value: f64) -> Self {
        SegmentValue::Number(value)
    }
}

impl From<bool> for SegmentValue {
    fn from(value: bool) -> Self {
        SegmentValue::Boolean(value)
    }
}

impl From<SystemTime> for SegmentValue {
    fn from(value: SystemTime) -> Self {
        SegmentValue::Timestamp(value)
    }
}

/// Normalize a segment set into the string map the server accepts.
pub fn normalize(segments: &SegmentSet) -> HashMap<String, String> {
    segments
        .iter()
        .map(|(name, value)| (name.clone(), value.render()))
        .collect()
}
