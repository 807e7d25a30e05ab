/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Server Communications.
//!
//! Everything the client says to the notification service goes through
//! the [`Connection`] trait: device activation, the server public key,
//! bearer-token issuance, the Safari device-id lookup, and the two
//! authenticated operations (segment update, event-log registration).
//!
//! The concrete [`ConnectHttp`] speaks the service's JSON API. Success is
//! exactly HTTP 200; 401 means the bearer token is no longer accepted and
//! 404 with the distinguished error code means the device was never
//! registered (or the server lost it). Those two are surfaced as typed
//! errors so the layers above can run their bounded recovery paths.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::error::{
    PushError::{
        AuthTokenExpiredError, CommunicationError, CommunicationServerError,
        DeviceNotRegisteredError,
    },
    Result,
};
use crate::internal::config::{PushConfiguration, API_VERSION};
use crate::internal::subscription::DeviceRegistration;

/// The error code the service pairs with a 404 to say "this device is not
/// registered" (as opposed to a plain unknown resource).
const DEVICE_NOT_REGISTERED_ERRNO: u32 = 3;

/// Some backend deployments serialize a missing field as the literal
/// string "undefined"; treat it as a parse failure, never as a value.
const UNDEFINED_SENTINEL: &str = "undefined";

#[derive(Deserialize, Debug)]
struct AuthTokenResponse {
    id_token: String,
}

#[derive(Deserialize, Debug)]
struct SafariDeviceResponse {
    device_id: String,
}

// The extended error object authenticated endpoints return.
#[derive(Deserialize, Default)]
struct ResponseError {
    pub code: Option<u32>,
    pub message: Option<String>,
}

/// A communication link to the notification service
#[cfg_attr(test, mockall::automock)]
pub trait Connection: Sized {
    /// Create a new instance of a [`Connection`]
    fn connect(options: PushConfiguration) -> Result<Self>;

    /// Register this browser's subscription with the service so it can be
    /// targeted. Re-run by the token recovery path when the server says
    /// the device is unknown.
    fn register_device(&self, registration: &DeviceRegistration) -> Result<()>;

    /// Fetch the server's public key, used by the hosting page as the
    /// `applicationServerKey` when subscribing.
    fn fetch_public_key(&self) -> Result<String>;

    /// Issue a bearer token for the device. The token is short-lived;
    /// expiry is discovered via 401 on a later call, not here.
    fn issue_auth_token(&self, device_id: &str) -> Result<String>;

    /// Look up the server-issued device id for a Safari device token.
    fn safari_device_id(&self, device_token: &str) -> Result<String>;

    /// Replace the device's segment attributes.
    fn update_segments(
        &self,
        device_id: &str,
        auth_token: &str,
        segments: &HashMap<String, String>,
    ) -> Result<()>;

    /// Report the "launched from notification" engagement event.
    fn register_event_log(
        &self,
        device_id: &str,
        auth_token: &str,
        notification_id: &str,
        device_time: u64,
    ) -> Result<()>;
}

/// Connect to the notification service via its HTTP interface
pub struct ConnectHttp {
    options: PushConfiguration,
    client: Client,
}

impl ConnectHttp {
    fn api_url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}://{}{}",
            &self.options.http_protocol, &self.options.server_host, path
        ))?)
    }

    fn service_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-API-Version", API_VERSION)
            .header("X-Service-Key", &self.options.service_key)
    }

    /// Map a non-200 response onto the error taxonomy. 200 passes the
    /// response through for the caller to parse.
    fn check_response_error(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthTokenExpiredError);
        }
        let error: ResponseError = response.json().unwrap_or_default();
        let message = error.message.unwrap_or_else(|| "unknown".to_string());
        if status.is_server_error() {
            return Err(CommunicationServerError(format!(
                "status: {} msg: {}",
                status.as_u16(),
                message
            )));
        }
        if status == StatusCode::NOT_FOUND && error.code == Some(DEVICE_NOT_REGISTERED_ERRNO) {
            return Err(DeviceNotRegisteredError(message));
        }
        Err(CommunicationError(format!(
            "status: {} msg: {}",
            status.as_u16(),
            message
        )))
    }
}

impl Connection for ConnectHttp {
    fn connect(options: PushConfiguration) -> Result<ConnectHttp> {
        // No request timeout: a hung call blocks its caller. Cancellation
        // is the hosting environment's concern, not this crate's.
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(ConnectHttp { options, client })
    }

    fn register_device(&self, registration: &DeviceRegistration) -> Result<()> {
        let url = self.api_url("/v1/devices/webpush")?;
        let response = self
            .service_headers(self.client.post(url.clone()))
            .json(registration)
            .send()?;
        log::info!("registered device via {} - {}", url, response.status());
        self.check_response_error(response)?;
        Ok(())
    }

    fn fetch_public_key(&self) -> Result<String> {
        let url = self.api_url("/v1/webpush/key")?;
        let response = self.service_headers(self.client.get(url)).send()?;
        log::debug!("fetched server public key - {}", response.status());
        Ok(self.check_response_error(response)?.text()?)
    }

    fn issue_auth_token(&self, device_id: &str) -> Result<String> {
        let url = self.api_url(&format!(
            "/v1/devices/{}/authentication-tokens",
            device_id
        ))?;
        let response = self
            .service_headers(self.client.post(url.clone()))
            .send()?;
        log::info!("issued auth token via {} - {}", url, response.status());
        let payload: AuthTokenResponse = self.check_response_error(response)?.json()?;
        if payload.id_token == UNDEFINED_SENTINEL {
            return Err(CommunicationError("auth token parse error".to_string()));
        }
        Ok(payload.id_token)
    }

    fn safari_device_id(&self, device_token: &str) -> Result<String> {
        let url = self.api_url(&format!("/v1/devices/safari/{}", device_token))?;
        let response = self.service_headers(self.client.get(url.clone())).send()?;
        log::info!("looked up safari device via {} - {}", url, response.status());
        let payload: SafariDeviceResponse = self.check_response_error(response)?.json()?;
        if payload.device_id == UNDEFINED_SENTINEL {
            return Err(CommunicationError("device id parse error".to_string()));
        }
        Ok(payload.device_id)
    }

    fn update_segments(
        &self,
        device_id: &str,
        auth_token: &str,
        segments: &HashMap<String, String>,
    ) -> Result<()> {
        let url = self.api_url(&format!("/v1/devices/{}/segments", device_id))?;
        let response = self
            .service_headers(self.client.put(url.clone()))
            .header("Accept", "application/json")
            .bearer_auth(auth_token)
            .json(&serde_json::json!({ "segments": segments }))
            .send()?;
        log::info!("updated segments via {} - {}", url, response.status());
        self.check_response_error(response)?;
        Ok(())
    }

    fn register_event_log(
        &self,
        device_id: &str,
        auth_token: &str,
        notification_id: &str,
        device_time: u64,
    ) -> Result<()> {
        let url = self.api_url(&format!("/v1/devices/{}/event-logs", device_id))?;
        let response = self
            .service_headers(self.client.post(url.clone()))
            .bearer_auth(auth_token)
            .json(&serde_json::json!({
                "notification_id": notification_id,
                "event": "launch",
                "device_time": device_time,
            }))
            .send()?;
        log::info!(
            "registered event log for '{}' via {} - {}",
            notification_id,
            url,
            response.status()
        );
        self.check_response_error(response)?;
        Ok(())
    }
}
