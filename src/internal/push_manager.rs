/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Main entrypoint for the client, orchestrates the authenticated calls
//!
//! Exposes a struct [`PushManager`] that ties the other pieces together:
//! it holds the subscription the hosting environment resolved, derives
//! the device identity per call, funnels the two authenticated operations
//! (segment update, event-log registration) through one bounded
//! refresh-on-401 wrapper, and guards the launch event with the durable
//! notification record so it is reported at most once.

use crate::error::{PushError, Result};
use crate::internal::communications::Connection;
use crate::internal::config::PushConfiguration;
use crate::internal::segments::{self, SegmentSet};
use crate::internal::storage::{now_secs, NotificationRecord, Storage};
use crate::internal::subscription::{resolve_device_id, DeviceRegistration, DeviceSubscription};
use crate::internal::token::TokenCache;

pub struct PushManager<Co, S> {
    connection: Co,
    store: S,
    domain: String,
    subscription: Option<DeviceSubscription>,
}

impl<Co: Connection, S: Storage> PushManager<Co, S> {
    pub fn new(config: PushConfiguration) -> Result<Self> {
        let store = S::open(&config.database_path)?;
        let domain = config.domain.clone();
        Ok(Self {
            connection: Co::connect(config)?,
            store,
            domain,
            subscription: None,
        })
    }

    /// Adopt the subscription the hosting environment resolved. Must be
    /// called before any device-scoped operation; the hosting page does
    /// this on every load, so nothing is persisted here.
    pub fn set_subscription(&mut self, subscription: DeviceSubscription) {
        log::debug!(
            "adopting subscription (safari: {})",
            subscription.is_safari()
        );
        self.subscription = Some(subscription);
    }

    pub fn subscription(&self) -> Option<&DeviceSubscription> {
        self.subscription.as_ref()
    }

    fn ensure_subscription(&self) -> Result<&DeviceSubscription> {
        self.subscription
            .as_ref()
            .ok_or_else(|| PushError::GeneralError("No subscription set yet.".into()))
    }

    /// The server's public key, for the hosting page to use as its
    /// `applicationServerKey` when subscribing.
    pub fn server_public_key(&self) -> Result<String> {
        self.connection.fetch_public_key()
    }

    /// Register the current subscription with the service.
    pub fn activate_device(&self) -> Result<()> {
        let subscription = self.ensure_subscription()?;
        let registration = subscription.registration(&self.domain).ok_or_else(|| {
            PushError::UnsupportedEnvironmentError(
                "Safari registration is mediated by the platform".into(),
            )
        })?;
        self.connection.register_device(&registration)
    }

    /// Replace the device's segment attributes on the server.
    pub fn update_segments(&self, segments: &SegmentSet) -> Result<()> {
        let subscription = self.ensure_subscription()?;
        let device_id = resolve_device_id(subscription, &self.connection)?;
        let registration = subscription.registration(&self.domain);
        let normalized = segments::normalize(segments);
        self.with_auth_retry(&device_id, registration.as_ref(), |token| {
            self.connection
                .update_segments(&device_id, token, &normalized)
        })
    }

    /// Report the "launched from notification" event for the pending
    /// notification, at most once.
    pub fn register_launch_event(&self) -> Result<()> {
        let subscription = self.ensure_subscription()?;
        // Event logs only exist for the standard flow; bail before
        // touching storage or the network.
        if subscription.is_safari() {
            return Err(PushError::UnsupportedEnvironmentError(
                "event logs are not available for Safari subscriptions".into(),
            ));
        }
        let record = self
            .store
            .get_notification()?
            .ok_or(PushError::NoPendingNotificationError)?;
        if record.event_log_sent {
            return Err(PushError::AlreadySentError);
        }

        let device_id = resolve_device_id(subscription, &self.connection)?;
        let registration = subscription.registration(&self.domain);
        self.with_auth_retry(&device_id, registration.as_ref(), |token| {
            self.connection.register_event_log(
                &device_id,
                token,
                &record.notification_id,
                now_secs(),
            )
        })?;

        // Only a successful report flips the flag; on failure the record
        // stays pending so a later attempt can retry.
        let mut sent = record;
        sent.event_log_sent = true;
        self.store.put_notification(&sent)?;
        log::info!("event log sent for '{}'", sent.notification_id);
        Ok(())
    }

    /// Store a freshly received notification, replacing any previous one.
    /// Called by the hosting service-worker context on push arrival.
    pub fn record_notification(&self, record: &NotificationRecord) -> Result<()> {
        self.store.put_notification(record)
    }

    pub fn last_notification(&self) -> Result<Option<NotificationRecord>> {
        self.store.get_notification()
    }

    pub fn clear_last_notification(&self) -> Result<bool> {
        self.store.delete_notification()
    }

    /// Forget the local authenticated state. The hosting page remains
    /// responsible for the browser-side subscription teardown.
    pub fn unsubscribe(&mut self) -> Result<()> {
        TokenCache::invalidate(&self.store)?;
        self.subscription = None;
        log::info!("unsubscribed - cleared auth token and subscription");
        Ok(())
    }

    /// Run an authenticated operation: acquire a token, execute, and on a
    /// 401 invalidate, reacquire and retry exactly once. A second 401 is
    /// terminal. The bound is this explicit sequence; nothing recurses.
    fn with_auth_retry<F>(
        &self,
        device_id: &str,
        registration: Option<&DeviceRegistration>,
        op: F,
    ) -> Result<()>
    where
        F: Fn(&str) -> Result<()>,
    {
        let token = TokenCache::acquire(&self.connection, &self.store, device_id, registration)?;
        match op(&token) {
            Err(PushError::AuthTokenExpiredError) => {
                log::info!("auth token no longer accepted - refreshing once");
                TokenCache::invalidate(&self.store)?;
                let token =
                    TokenCache::acquire(&self.connection, &self.store, device_id, registration)?;
                match op(&token) {
                    Err(PushError::AuthTokenExpiredError) => Err(PushError::CommunicationError(
                        "authentication token rejected after refresh".to_string(),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::internal::communications::MockConnection;
    use crate::internal::segments::SegmentValue;
    use crate::internal::storage::Store;
    use lazy_static::lazy_static;
    use std::sync::{Mutex, MutexGuard};

    lazy_static! {
        static ref MTX: Mutex<()> = Mutex::new(());
    }

    // we need to run our tests in sequence. The tests mock static
    // methods. Mocked static methods are global are susceptible to data races
    // see: https://docs.rs/mockall/latest/mockall/#static-methods
    fn get_lock(m: &'static Mutex<()>) -> MutexGuard<'static, ()> {
        match m.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // auth secret [0, 0, 0] encodes to this device id.
    const TEST_DEVICE_ID: &str = "AAAA";
    const TEST_NOTIFICATION_ID: &str = "n-0001";

    fn standard_subscription() -> DeviceSubscription {
        DeviceSubscription::Standard {
            endpoint: "https://push.example.com/send/abc".to_owned(),
            auth_secret: vec![0, 0, 0],
            p256dh_key: vec![4u8; 65],
        }
    }

    fn safari_subscription() -> DeviceSubscription {
        DeviceSubscription::Safari {
            device_token: "DEVTOKEN".to_owned(),
            website_push_id: "web.com.example".to_owned(),
        }
    }

    fn get_test_manager() -> Result<PushManager<MockConnection, Store>> {
        let config = PushConfiguration::default();
        PushManager::new(config)
    }

    fn pending_record() -> NotificationRecord {
        NotificationRecord::new(TEST_NOTIFICATION_ID, "Sale ends tonight", "Everything must go")
    }

    #[test]
    fn segment_update_refreshes_expired_token_once() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(standard_subscription());

        let mut issuances = 0;
        pm.connection
            .expect_issue_auth_token()
            .withf(|device_id| device_id == TEST_DEVICE_ID)
            .times(2)
            .returning(move |_| {
                issuances += 1;
                Ok(format!("T{}", issuances))
            });
        // The stale token is rejected once; the refreshed one succeeds.
        pm.connection
            .expect_update_segments()
            .withf(|device_id, _, segments| {
                device_id == TEST_DEVICE_ID
                    && segments["hobby"] == "game"
                    && segments["age"] == "30"
            })
            .times(2)
            .returning(|_, token, _| {
                if token == "T1" {
                    Err(PushError::AuthTokenExpiredError)
                } else {
                    Ok(())
                }
            });

        let mut segments = SegmentSet::new();
        segments.insert("hobby".into(), "game".into());
        segments.insert("age".into(), SegmentValue::Number(30.0));
        pm.update_segments(&segments)?;
        assert_eq!(pm.store.get_auth_token()?, Some("T2".to_owned()));
        Ok(())
    }

    #[test]
    fn second_401_is_terminal_and_invalidates_once() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(standard_subscription());

        let mut issuances = 0;
        pm.connection
            .expect_issue_auth_token()
            .times(2)
            .returning(move |_| {
                issuances += 1;
                Ok(format!("T{}", issuances))
            });
        pm.connection
            .expect_update_segments()
            .times(2)
            .returning(|_, _, _| Err(PushError::AuthTokenExpiredError));

        let err = pm.update_segments(&SegmentSet::new()).unwrap_err();
        assert!(matches!(err, PushError::CommunicationError(_)));
        // The cache was invalidated exactly once: the refreshed token is
        // still in the slot, even though the server rejected it too.
        assert_eq!(pm.store.get_auth_token()?, Some("T2".to_owned()));
        Ok(())
    }

    #[test]
    fn non_401_failures_are_terminal_immediately() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(standard_subscription());

        pm.connection
            .expect_issue_auth_token()
            .times(1)
            .returning(|_| Ok("T1".to_owned()));
        pm.connection
            .expect_update_segments()
            .times(1)
            .returning(|_, _, _| Err(PushError::CommunicationError("status: 400".to_owned())));

        let err = pm.update_segments(&SegmentSet::new()).unwrap_err();
        assert!(matches!(err, PushError::CommunicationError(_)));
        Ok(())
    }

    #[test]
    fn launch_event_is_reported_at_most_once() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(standard_subscription());
        pm.record_notification(&pending_record())?;

        pm.connection
            .expect_issue_auth_token()
            .times(1)
            .returning(|_| Ok("T1".to_owned()));
        pm.connection
            .expect_register_event_log()
            .withf(|device_id, token, notification_id, device_time| {
                device_id == TEST_DEVICE_ID
                    && token == "T1"
                    && notification_id == TEST_NOTIFICATION_ID
                    && *device_time > 0
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        pm.register_launch_event()?;
        assert!(pm.last_notification()?.unwrap().event_log_sent);

        // The flag short-circuits before any network call; the mock
        // would panic on a second registration attempt.
        let err = pm.register_launch_event().unwrap_err();
        assert!(matches!(err, PushError::AlreadySentError));
        Ok(())
    }

    #[test]
    fn launch_event_failure_leaves_record_pending() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(standard_subscription());
        pm.record_notification(&pending_record())?;

        pm.connection
            .expect_issue_auth_token()
            .times(1)
            .returning(|_| Ok("T1".to_owned()));
        pm.connection
            .expect_register_event_log()
            .times(1)
            .returning(|_, _, _, _| {
                Err(PushError::CommunicationServerError("status: 500".to_owned()))
            });

        let err = pm.register_launch_event().unwrap_err();
        assert!(matches!(err, PushError::CommunicationServerError(_)));
        assert!(!pm.last_notification()?.unwrap().event_log_sent);
        Ok(())
    }

    #[test]
    fn launch_event_without_notification_short_circuits() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(standard_subscription());
        // No expectations: any network call would panic the mock.
        let err = pm.register_launch_event().unwrap_err();
        assert!(matches!(err, PushError::NoPendingNotificationError));
        Ok(())
    }

    #[test]
    fn launch_event_is_unsupported_under_safari() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(safari_subscription());
        // Even a pending record must not be touched.
        pm.record_notification(&pending_record())?;
        let err = pm.register_launch_event().unwrap_err();
        assert!(matches!(err, PushError::UnsupportedEnvironmentError(_)));
        assert!(!pm.last_notification()?.unwrap().event_log_sent);
        Ok(())
    }

    #[test]
    fn safari_identity_failure_requests_no_token() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(safari_subscription());

        pm.connection
            .expect_safari_device_id()
            .withf(|device_token| device_token == "DEVTOKEN")
            .times(1)
            .returning(|_| Err(PushError::CommunicationError("status: 404".to_owned())));
        // No issue_auth_token expectation: requesting one would panic.
        let err = pm.update_segments(&SegmentSet::new()).unwrap_err();
        assert!(matches!(err, PushError::IdentityUnavailableError(_)));
        Ok(())
    }

    #[test]
    fn safari_segments_use_looked_up_device_id() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(safari_subscription());

        pm.connection
            .expect_safari_device_id()
            .times(1)
            .returning(|_| Ok("SAFARI-1".to_owned()));
        pm.connection
            .expect_issue_auth_token()
            .withf(|device_id| device_id == "SAFARI-1")
            .times(1)
            .returning(|_| Ok("T1".to_owned()));
        pm.connection
            .expect_update_segments()
            .withf(|device_id, token, _| device_id == "SAFARI-1" && token == "T1")
            .times(1)
            .returning(|_, _, _| Ok(()));

        pm.update_segments(&SegmentSet::new())?;
        Ok(())
    }

    #[test]
    fn operations_require_a_subscription() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let pm = get_test_manager()?;
        assert!(matches!(
            pm.update_segments(&SegmentSet::new()).unwrap_err(),
            PushError::GeneralError(_)
        ));
        assert!(matches!(
            pm.register_launch_event().unwrap_err(),
            PushError::GeneralError(_)
        ));
        Ok(())
    }

    #[test]
    fn unsubscribe_clears_token_and_subscription() -> Result<()> {
        let _m = get_lock(&MTX);
        let ctx = MockConnection::connect_context();
        ctx.expect().returning(|_| Ok(MockConnection::default()));

        let mut pm = get_test_manager()?;
        pm.set_subscription(standard_subscription());
        pm.store.set_auth_token("T1")?;

        pm.unsubscribe()?;
        assert_eq!(pm.store.get_auth_token()?, None);
        assert!(pm.subscription().is_none());
        Ok(())
    }
}
