//! Toolkit error types with stable numeric codes.
//!
//! [`ToolkitError`] is the central error type of the crate. It is what a
//! command completion receives in its `Err` arm and what every fallible
//! session operation returns.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{EventType, ResultKind, TransactionId};

/// Error body reported by the robot itself.
///
/// Carried in the payload of `onError` and `onAssetFailed` events:
/// ```json
/// {
///   "code": 404,
///   "message": "asset not reachable",
///   "details": null
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceError {
    /// Numeric code assigned by the robot (0 when absent).
    #[serde(default)]
    pub code: u32,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
    /// Optional additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Crate-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category     |
/// |-----------|--------------|
/// | 1000–1999 | Session      |
/// | 2000–2999 | Transaction  |
/// | 3000–3999 | Media        |
/// | 4000–4999 | Device       |
/// | 5000–5999 | Internal     |
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolkitError {
    /// A command was issued before the account was authenticated.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A command was issued while no robot is connected.
    #[error("not connected to a robot")]
    NotConnected,

    /// Authentication flow failed or was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Robot discovery (robot list or IP lookup) failed.
    #[error("robot discovery failed: {0}")]
    Discovery(String),

    /// The transport could not send a command or open the connection.
    #[error("transport send failure: {0}")]
    TransportSend(String),

    /// A decoded payload did not match the kind the transaction expects.
    ///
    /// Never delivered to a completion; only reported by the router.
    #[error("decode mismatch: expected {expected}, got event {actual}")]
    DecodeMismatch {
        /// Result kind recorded at registration.
        expected: ResultKind,
        /// Event type tag that arrived.
        actual: EventType,
    },

    /// The payload of a correlated event could not be decoded.
    #[error("failed to decode event for transaction {transaction_id}: {reason}")]
    CorrelatedDecode {
        /// Transaction the event was addressed to.
        transaction_id: TransactionId,
        /// Decoder message.
        reason: String,
    },

    /// The short-lived media certificate could not be obtained.
    #[error("certificate fetch failed: {0}")]
    CertificateFetch(String),

    /// The side-channel media fetch failed.
    #[error("media fetch failed: {0}")]
    MediaFetch(String),

    /// The wire-level cancel request failed.
    #[error("cancel failed: {0}")]
    Cancel(String),

    /// The robot reported an error for the transaction.
    #[error("device error: {0}")]
    Device(DeviceError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ToolkitError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::NotAuthenticated => 1001,
            Self::NotConnected => 1002,
            Self::Authentication(_) => 1003,
            Self::Discovery(_) => 1004,
            Self::TransportSend(_) => 2001,
            Self::DecodeMismatch { .. } => 2002,
            Self::CorrelatedDecode { .. } => 2003,
            Self::Cancel(_) => 2004,
            Self::CertificateFetch(_) => 3001,
            Self::MediaFetch(_) => 3002,
            Self::Device(_) => 4001,
            Self::Internal(_) => 5000,
        }
    }

    /// Returns `true` for errors raised before anything was sent.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::NotConnected)
    }
}
