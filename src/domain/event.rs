//! Inbound event envelopes and session-level broadcast events.
//!
//! [`EventEnvelope`] is what the transport hands to the router for every
//! decoded inbound message. [`SessionEvent`] is what the session publishes
//! through the [`super::EventBus`] for anything not owned by a single
//! transaction.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TransactionId;

/// Event type tag carried by every inbound envelope.
///
/// Unrecognised tags decode as [`EventType::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventType {
    /// A command started executing.
    #[serde(rename = "onStart")]
    AsyncStart,
    /// A command stopped executing.
    #[serde(rename = "onStop")]
    AsyncStop,
    /// A command failed on the robot.
    #[serde(rename = "onError")]
    AsyncError,

    /// A tracked entity moved.
    #[serde(rename = "onEntityUpdate")]
    TrackUpdate,
    /// A tracked entity left the perceptual space.
    #[serde(rename = "onEntityLost")]
    TrackLost,
    /// A new entity entered the perceptual space.
    #[serde(rename = "onEntityGained")]
    TrackGained,

    /// The robot reached its look-at target.
    #[serde(rename = "onLookAtAchieved")]
    LookAtAchieved,
    /// The entity the robot was looking at was lost.
    #[serde(rename = "onTrackEntityLost")]
    TrackEntityLost,

    /// A video stream is ready to fetch.
    #[serde(rename = "onVideoReady")]
    VideoReady,
    /// A photo was taken and is ready to fetch.
    #[serde(rename = "onTakePhoto")]
    TakePhoto,

    /// The display view changed state.
    #[serde(rename = "onViewStateChange")]
    ViewStateChange,
    /// The screen was tapped.
    #[serde(rename = "onTap")]
    ScreenTap,
    /// The screen was swiped.
    #[serde(rename = "onSwipe")]
    ScreenSwipe,

    /// Motion was detected.
    #[serde(rename = "onMotionDetected")]
    MotionDetected,
    /// The head touch sensors changed.
    #[serde(rename = "onHeadTouch")]
    HeadTouched,

    /// The hot word was heard.
    #[serde(rename = "onHotWordHeard")]
    HotWordHeard,
    /// Speech recognition produced a result.
    #[serde(rename = "onListenResult")]
    ListenResult,
    /// Listening stopped without a result.
    #[serde(rename = "onListenStop")]
    ListenStop,

    /// An asset finished loading.
    #[serde(rename = "onAssetReady")]
    AssetReady,
    /// An asset could not be loaded.
    #[serde(rename = "onAssetFailed")]
    AssetFailed,

    /// Configuration was read or changed.
    #[serde(rename = "onConfig")]
    Config,

    /// Unknown or missing tag. Must stay the last variant: serde routes
    /// unrecognised tags here.
    #[default]
    #[serde(other, rename = "")]
    Undefined,
}

impl EventType {
    /// Returns the wire tag for this event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "",
            Self::AsyncStart => "onStart",
            Self::AsyncStop => "onStop",
            Self::AsyncError => "onError",
            Self::TrackUpdate => "onEntityUpdate",
            Self::TrackLost => "onEntityLost",
            Self::TrackGained => "onEntityGained",
            Self::LookAtAchieved => "onLookAtAchieved",
            Self::TrackEntityLost => "onTrackEntityLost",
            Self::VideoReady => "onVideoReady",
            Self::TakePhoto => "onTakePhoto",
            Self::ViewStateChange => "onViewStateChange",
            Self::ScreenTap => "onTap",
            Self::ScreenSwipe => "onSwipe",
            Self::MotionDetected => "onMotionDetected",
            Self::HeadTouched => "onHeadTouch",
            Self::HotWordHeard => "onHotWordHeard",
            Self::ListenResult => "onListenResult",
            Self::ListenStop => "onListenStop",
            Self::AssetReady => "onAssetReady",
            Self::AssetFailed => "onAssetFailed",
            Self::Config => "onConfig",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("<undefined>"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One decoded inbound message from the robot.
///
/// Consumed exactly once by [`crate::service::EventRouter::route`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Event type discriminator.
    #[serde(default)]
    pub event_type: EventType,
    /// Transaction this event answers, if any.
    #[serde(default)]
    pub transaction_id: Option<TransactionId>,
    /// Variant-specific payload, decoded lazily by the router.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Creates an envelope correlated to a transaction.
    #[must_use]
    pub const fn correlated(
        event_type: EventType,
        transaction_id: TransactionId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            transaction_id: Some(transaction_id),
            payload,
        }
    }

    /// Creates an envelope not tied to any transaction.
    #[must_use]
    pub const fn broadcast(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            transaction_id: None,
            payload,
        }
    }
}

/// Projection of the authentication and connection axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Neither authenticated nor connected.
    Disconnected,
    /// Sign-in in progress.
    Authenticating,
    /// Signed in, no robot connected.
    AuthenticatedDisconnected,
    /// Connecting to a robot.
    Connecting,
    /// Signed in and connected; commands are accepted.
    Connected,
}

impl ConnectionState {
    /// Returns `true` only for [`ConnectionState::Connected`].
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Session-level event published on the [`super::EventBus`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session moved to a new connection state.
    ConnectionStateChanged {
        /// New state.
        state: ConnectionState,
        /// Why the state changed, when it was not requested by the caller.
        reason: Option<String>,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An inbound event that carried no transaction id.
    Unsolicited {
        /// Event type tag.
        event_type: EventType,
        /// Raw payload.
        payload: serde_json::Value,
        /// Arrival timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Returns the event kind as a static string slice.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::Unsolicited { .. } => "unsolicited",
        }
    }
}
