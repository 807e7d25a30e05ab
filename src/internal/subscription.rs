/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Device subscriptions and identity resolution.
//!
//! A browser supports exactly one of two push mechanisms, represented by
//! the two [`DeviceSubscription`] variants. The service identifies a
//! device by a single opaque string whatever the mechanism:
//!
//! * [`DeviceSubscription::Standard`] - the identifier is the URL-safe
//!   base64 form of the subscription's auth secret, derived locally.
//! * [`DeviceSubscription::Safari`] - the identifier is issued by the
//!   server and looked up by device token, so resolution needs a round
//!   trip and has its own failure path.
//!
//! Identifiers are recomputed from the subscription whenever they are
//! needed; they are never persisted.

use base64::{alphabet, engine, engine::general_purpose, Engine};
use serde::Serialize;

use crate::error::{PushError, Result};
use crate::internal::communications::Connection;

// The hosting page hands us key material as raw bytes; the original wire
// format keeps base64 padding, so plain URL_SAFE rather than NO_PAD.
const URL_SAFE_LENIENT: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::URL_SAFE,
    general_purpose::GeneralPurposeConfig::new()
        .with_decode_padding_mode(engine::DecodePaddingMode::Indifferent),
);

/// The push subscription the hosting environment resolved for this
/// browser. Exactly one variant is ever active; platform capability picks
/// it, not the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSubscription {
    /// A standard Web Push subscription.
    Standard {
        /// Push service endpoint URL for this subscription.
        endpoint: String,
        /// The subscription's auth secret.
        auth_secret: Vec<u8>,
        /// The subscription's P-256 ECDH public key.
        p256dh_key: Vec<u8>,
    },
    /// An Apple-mediated Safari push registration.
    Safari {
        /// Device token issued by the platform permission flow.
        device_token: String,
        /// The website push id the token was issued for.
        website_push_id: String,
    },
}

impl DeviceSubscription {
    pub fn is_safari(&self) -> bool {
        matches!(self, DeviceSubscription::Safari { .. })
    }

    /// The device-registration payload for this subscription, or `None`
    /// for the Safari variant (Apple mediates its registration).
    pub(crate) fn registration(&self, domain: &str) -> Option<DeviceRegistration> {
        match self {
            DeviceSubscription::Standard {
                endpoint,
                auth_secret,
                p256dh_key,
            } => Some(DeviceRegistration {
                endpoint: endpoint.clone(),
                p256dh: URL_SAFE_LENIENT.encode(p256dh_key),
                auth: URL_SAFE_LENIENT.encode(auth_secret),
                domain: domain.to_owned(),
            }),
            DeviceSubscription::Safari { .. } => None,
        }
    }
}

/// The body of the device activation call.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceRegistration {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub domain: String,
}

/// Derive the service's canonical device identifier for a subscription.
///
/// Pure for the Standard variant. The Safari variant asks the server; any
/// failure there - non-success status, unparseable body - is terminal for
/// the current call and surfaces as
/// [`PushError::IdentityUnavailableError`]. Retrying is left to the
/// caller's own orchestration.
pub fn resolve_device_id<Co: Connection>(
    subscription: &DeviceSubscription,
    connection: &Co,
) -> Result<String> {
    match subscription {
        DeviceSubscription::Standard { auth_secret, .. } => {
            Ok(URL_SAFE_LENIENT.encode(auth_secret))
        }
        DeviceSubscription::Safari { device_token, .. } => connection
            .safari_device_id(device_token)
            .map_err(|e| PushError::IdentityUnavailableError(e.to_string())),
    }
}

/// Decode the server's public key into the raw bytes the subscribe call
/// wants as its `applicationServerKey`.
pub fn decode_public_key(key: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(key.trim())
        .map_err(|e| PushError::GeneralError(format!("Invalid server public key: {}", e)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::internal::communications::MockConnection;

    fn standard(auth_secret: Vec<u8>) -> DeviceSubscription {
        DeviceSubscription::Standard {
            endpoint: "https://push.example.com/send/abc".to_string(),
            auth_secret,
            p256dh_key: vec![4u8; 65],
        }
    }

    #[test]
    fn standard_identity_is_pure_and_deterministic() {
        let sub = standard(vec![0, 0, 0]);
        // MockConnection with no expectations: any network call would panic.
        let conn = MockConnection::new();
        let first = resolve_device_id(&sub, &conn).unwrap();
        let second = resolve_device_id(&sub, &conn).unwrap();
        assert_eq!(first, "AAAA");
        assert_eq!(first, second);
    }

    #[test]
    fn standard_identity_keeps_padding() {
        let sub = standard(vec![0xff; 16]);
        let conn = MockConnection::new();
        let id = resolve_device_id(&sub, &conn).unwrap();
        assert_eq!(id, "_____________________w==");
    }

    #[test]
    fn safari_identity_failure_is_identity_unavailable() {
        let sub = DeviceSubscription::Safari {
            device_token: "DEVTOKEN".to_string(),
            website_push_id: "web.com.example".to_string(),
        };
        let mut conn = MockConnection::new();
        conn.expect_safari_device_id()
            .times(1)
            .returning(|_| Err(PushError::CommunicationError("404".to_string())));
        let err = resolve_device_id(&sub, &conn).unwrap_err();
        assert!(matches!(err, PushError::IdentityUnavailableError(_)));
    }

    #[test]
    fn registration_payload() {
        let sub = standard(vec![0, 0, 0]);
        let registration = sub.registration("example.com").unwrap();
        assert_eq!(registration.auth, "AAAA");
        assert_eq!(registration.domain, "example.com");
        let body = serde_json::to_value(&registration).unwrap();
        assert_eq!(body["endpoint"], "https://push.example.com/send/abc");
        assert_eq!(body["auth"], "AAAA");
        assert!(body["p256dh"].as_str().unwrap().starts_with("BAQE"));

        let safari = DeviceSubscription::Safari {
            device_token: "DEVTOKEN".to_string(),
            website_push_id: "web.com.example".to_string(),
        };
        assert!(safari.registration("example.com").is_none());
    }

    #[test]
    fn decode_public_key_accepts_padded_and_unpadded() {
        let bytes = vec![1u8, 2, 3, 4];
        assert_eq!(decode_public_key("AQIDBA==").unwrap(), bytes);
        assert_eq!(decode_public_key("AQIDBA").unwrap(), bytes);
        assert!(decode_public_key("not base64!").is_err());
    }
}
