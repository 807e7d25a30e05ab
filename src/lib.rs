/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

#![allow(unknown_lints)]
#![warn(rust_2018_idioms)]
//! # Web Push Service Client
//!
//! This crate maintains a browser's authenticated relationship with a
//! remote push notification service: it registers the device, keeps a
//! short-lived bearer token fresh, synchronizes user-segment attributes
//! for audience targeting, and reports the "launched from notification"
//! engagement event at most once per received notification.
//!
//! ## Background Concepts
//!
//! ### Device identity
//!
//! A browser supports exactly one of two push mechanisms. Standard Web
//! Push subscriptions identify themselves to the service by the URL-safe
//! base64 form of their auth secret; Safari registrations are identified
//! by a server-issued device id looked up from the Apple device token.
//! Both converge on one opaque device identifier, derived fresh from the
//! active [`DeviceSubscription`] whenever it is needed and never stored.
//!
//! ### Bearer tokens
//!
//! The segment and event-log endpoints require a short-lived bearer
//! token scoped to the device. The token is cached in the client's
//! single persisted slot and refreshed reactively: when a call comes
//! back 401 the cached token is dropped, a fresh one is issued, and the
//! call retried exactly once. If issuance reveals the service no longer
//! knows the device, the device is re-registered and issuance retried
//! once before giving up.
//!
//! ### The notification record
//!
//! The hosting service worker stores the most recently received
//! notification through [`PushClient::record_notification`]; exactly one
//! record exists at a time. [`PushClient::register_launch_event`]
//! consults it so the engagement event for a notification is reported to
//! the server at most once, across page reloads.
//!
//! ## Initialization
//!
//! Calls are handled by the [`PushClient`], which provides a handle for
//! future calls. Configuration comes from the caller - a service key and
//! authorized domain at minimum - never from the environment:
//!
//! ```no_run
//! use webpush_client::{PushClient, PushConfiguration, Protocol};
//!
//! let client = PushClient::new(PushConfiguration {
//!     server_host: "api.push.example.com".into(),
//!     http_protocol: Protocol::Https,
//!     service_key: "SERVICE_KEY".into(),
//!     domain: "shop.example.com".into(),
//!     website_push_id: None,
//!     database_path: "/path/to/webpush.sqlite".into(),
//! })?;
//! # Ok::<(), webpush_client::PushError>(())
//! ```
//!
//! The hosting page then hands over the subscription it resolved and
//! drives the device-scoped calls:
//!
//! ```no_run
//! # use webpush_client::*;
//! # fn demo(client: &PushClient, sub: DeviceSubscription) -> Result<()> {
//! client.set_subscription(sub);
//! client.activate_device()?;
//!
//! let mut segments = SegmentSet::new();
//! segments.insert("hobby".into(), "game".into());
//! segments.insert("age".into(), SegmentValue::Number(30.0));
//! client.update_segments(&segments)?;
//! # Ok(())
//! # }
//! ```

mod error;
mod internal;

use std::sync::Mutex;

use internal::communications::ConnectHttp;
use internal::push_manager;
use internal::storage::Store;

pub use error::{PushError, Result};
pub use internal::config::{Protocol, PushConfiguration};
pub use internal::segments::{SegmentSet, SegmentValue};
pub use internal::storage::NotificationRecord;
pub use internal::subscription::{decode_public_key, DeviceSubscription};
pub use internal::token::AUTH_TOKEN_TTL_MINUTES;

/// Object representing the client's relationship with the push service
///
/// The `PushClient` object is the main interface provided by this crate.
/// It persists the bearer-token slot and the notification record, and
/// serializes all access on a mutex for thread safety.
pub struct PushClient {
    internal: Mutex<push_manager::PushManager<ConnectHttp, Store>>,
}

impl PushClient {
    /// Creates a new [`PushClient`] with no subscription adopted yet.
    ///
    /// # Arguments
    ///   - `config`: [`PushConfiguration`] for this instance
    ///
    /// # Errors
    /// Returns an error in the following cases:
    ///   - The client is unable to open the `database_path` given
    ///   - The HTTP stack could not be initialized
    pub fn new(config: PushConfiguration) -> Result<Self> {
        log::debug!(
            "PushClient server_host: {}, http_protocol: {}",
            config.server_host,
            config.http_protocol
        );
        Ok(Self {
            internal: Mutex::new(push_manager::PushManager::new(config)?),
        })
    }

    /// Adopt the push subscription the hosting environment resolved.
    /// Device-scoped calls fail until this has happened; the hosting page
    /// calls it on every load.
    pub fn set_subscription(&self, subscription: DeviceSubscription) {
        self.internal.lock().unwrap().set_subscription(subscription)
    }

    /// The currently adopted subscription, if any.
    pub fn subscription(&self) -> Option<DeviceSubscription> {
        self.internal.lock().unwrap().subscription().cloned()
    }

    /// Fetch the server's public key for use as the hosting page's
    /// `applicationServerKey` (see [`decode_public_key`]).
    pub fn server_public_key(&self) -> Result<String> {
        self.internal.lock().unwrap().server_public_key()
    }

    /// Register the adopted subscription with the service so this device
    /// can be targeted.
    ///
    /// # Errors
    /// Returns an error in the following cases:
    ///   - No subscription has been adopted
    ///   - The subscription is the Safari variant (Apple mediates its
    ///     registration)
    ///   - The service rejected the registration
    pub fn activate_device(&self) -> Result<()> {
        self.internal.lock().unwrap().activate_device()
    }

    /// Replace this device's segment attributes on the server.
    ///
    /// Values are normalized to the wire representation first; see
    /// [`SegmentValue`]. A stale bearer token is refreshed and the call
    /// retried once, transparently.
    pub fn update_segments(&self, segments: &SegmentSet) -> Result<()> {
        self.internal.lock().unwrap().update_segments(segments)
    }

    /// Report that the app was launched from the pending notification.
    ///
    /// # Errors
    /// Returns an error in the following cases:
    ///   - [`PushError::NoPendingNotificationError`] - nothing received
    ///   - [`PushError::AlreadySentError`] - already reported; both of
    ///     these short-circuit before any network call
    ///   - [`PushError::UnsupportedEnvironmentError`] - Safari variant
    ///   - The authenticated call failed; the record stays pending so a
    ///     later attempt may retry
    pub fn register_launch_event(&self) -> Result<()> {
        self.internal.lock().unwrap().register_launch_event()
    }

    /// Store a freshly received notification, unconditionally replacing
    /// the previous one. Called from the hosting service-worker context.
    pub fn record_notification(&self, record: &NotificationRecord) -> Result<()> {
        self.internal.lock().unwrap().record_notification(record)
    }

    /// The most recently received notification, or `None`.
    pub fn last_notification(&self) -> Result<Option<NotificationRecord>> {
        self.internal.lock().unwrap().last_notification()
    }

    /// Drop the stored notification record. Returns whether one existed.
    pub fn clear_last_notification(&self) -> Result<bool> {
        self.internal.lock().unwrap().clear_last_notification()
    }

    /// Forget the local authenticated state (bearer token, adopted
    /// subscription). The hosting page remains responsible for the
    /// browser-side `PushSubscription` teardown.
    pub fn unsubscribe(&self) -> Result<()> {
        self.internal.lock().unwrap().unsubscribe()
    }
}
