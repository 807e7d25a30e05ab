/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

pub type Result<T> = std::result::Result<T, PushError>;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// An unspecified general error has occured
    #[error("General Error: {0:?}")]
    GeneralError(String),

    /// A client communication error, including any non-success response
    /// status that is not otherwise distinguished below.
    #[error("Communication Error: {0:?}")]
    CommunicationError(String),

    /// An error returned from the push service itself (5xx)
    #[error("Communication Server Error: {0:?}")]
    CommunicationServerError(String),

    /// A device identifier could not be derived for the active
    /// subscription. Terminal for the current call; there is no retry on
    /// this path.
    #[error("Device identity unavailable: {0:?}")]
    IdentityUnavailableError(String),

    /// An authentication token could not be obtained, including after the
    /// single re-registration retry.
    #[error("Token issuance failed: {0:?}")]
    TokenIssuanceError(String),

    /// The server rejected the bearer token (401). Consumed internally by
    /// the single refresh-and-retry; a repeat becomes a
    /// [`PushError::CommunicationError`].
    #[error("Authentication token expired or revoked")]
    AuthTokenExpiredError,

    /// The server reports this device as not registered (the
    /// distinguished 404 error code). Consumed internally by the token
    /// recovery path.
    #[error("Device not registered: {0:?}")]
    DeviceNotRegisteredError(String),

    /// The pending notification's launch event was already reported.
    #[error("Event log already sent for the current notification")]
    AlreadySentError,

    /// There is no received notification to report a launch event for.
    #[error("No pending notification")]
    NoPendingNotificationError,

    /// The operation is not available for the active subscription variant.
    #[error("Unsupported environment: {0:?}")]
    UnsupportedEnvironmentError(String),

    /// An error with Storage
    #[error("Storage Error: {0:?}")]
    StorageError(String),

    /// A failure executing SQL against the persisted store.
    #[error("Error executing SQL: {0}")]
    StorageSqlError(#[from] rusqlite::Error),

    /// A transport-level HTTP failure.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A failure to parse a response payload.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A failure to parse a URL.
    #[error("URL parse error: {0:?}")]
    UrlParseError(#[from] url::ParseError),
}
