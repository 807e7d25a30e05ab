/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The persisted bearer-token cache.
//!
//! Authenticated calls need a short-lived token scoped to the device
//! identity and service key. The token lives in the store's single fixed
//! slot: whoever holds the store shares the token. Expiry is never
//! tracked locally - the server signals it with a 401 and the caller
//! invalidates and re-acquires (once; see the manager's retry wrapper).

use crate::error::{PushError, Result};
use crate::internal::communications::Connection;
use crate::internal::storage::Storage;
use crate::internal::subscription::DeviceRegistration;

/// Nominal token lifetime, for documentation and consumers that want to
/// schedule refreshes themselves. Nothing in this crate enforces it.
pub const AUTH_TOKEN_TTL_MINUTES: u64 = 60;

pub struct TokenCache;

impl TokenCache {
    /// Return a bearer token for `device_id`, issuing and persisting one
    /// if the slot is empty.
    ///
    /// If issuance fails because the server does not know the device, the
    /// device is re-registered with `registration` and issuance retried
    /// exactly once; a second failure - or a missing registration
    /// payload, as with the Safari variant - is terminal.
    ///
    /// Interleaved callers may both refresh the single slot; the later
    /// write wins. This is a best-effort cache, not a linearizable store.
    pub fn acquire<Co: Connection, S: Storage>(
        connection: &Co,
        store: &S,
        device_id: &str,
        registration: Option<&DeviceRegistration>,
    ) -> Result<String> {
        if let Some(token) = store.get_auth_token()? {
            log::debug!("using cached auth token");
            return Ok(token);
        }
        let token = match connection.issue_auth_token(device_id) {
            Ok(token) => token,
            Err(PushError::DeviceNotRegisteredError(msg)) => {
                log::info!("server lost this device ({}) - re-registering", msg);
                let registration = registration.ok_or_else(|| {
                    PushError::TokenIssuanceError(format!(
                        "device not registered and re-registration is unavailable: {}",
                        msg
                    ))
                })?;
                connection
                    .register_device(registration)
                    .map_err(|e| PushError::TokenIssuanceError(e.to_string()))?;
                connection
                    .issue_auth_token(device_id)
                    .map_err(|e| PushError::TokenIssuanceError(e.to_string()))?
            }
            Err(e) => return Err(PushError::TokenIssuanceError(e.to_string())),
        };
        store.set_auth_token(&token)?;
        Ok(token)
    }

    /// Drop the persisted token; the next acquire fetches a fresh one.
    /// Called when a dependent call got a 401 and on unsubscribe.
    pub fn invalidate<S: Storage>(store: &S) -> Result<()> {
        log::debug!("invalidating cached auth token");
        store.delete_auth_token()
    }
}
