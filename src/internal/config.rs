/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Provides configuration for the [PushClient](`crate::PushClient`)
//!

use std::{fmt::Display, str::FromStr};

use crate::PushError;

/// The API version every request is pinned to, sent as `X-API-Version`.
pub const API_VERSION: &str = "2017-04-01";

#[derive(Clone, Debug)]
pub struct PushConfiguration {
    /// host name:port
    pub server_host: String,

    /// http protocol (production uses "https")
    pub http_protocol: Protocol,

    /// Service key issued for the consuming site, sent as `X-Service-Key`
    /// on every API call.
    pub service_key: String,

    /// The website domain authorized to receive push notifications,
    /// registered alongside the device.
    pub domain: String,

    /// Website push id for the Safari flow. Consumed by the hosting
    /// page's permission query; carried here so one configuration value
    /// covers both variants.
    pub website_push_id: Option<String>,

    /// OS Path to the database
    pub database_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Protocol {
    Https,
    Http,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Protocol::Http => "http",
                Protocol::Https => "https",
            }
        )
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Https
    }
}

impl FromStr for Protocol {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            _ => return Err(PushError::GeneralError("Invalid protocol".to_string())),
        })
    }
}

#[cfg(test)]
impl Default for PushConfiguration {
    fn default() -> PushConfiguration {
        PushConfiguration {
            server_host: String::from("api.push.example.com"),
            http_protocol: Protocol::Https,
            service_key: String::from("test-service-key"),
            domain: String::from("example.com"),
            website_push_id: None,
            database_path: String::from(""),
        }
    }
}
