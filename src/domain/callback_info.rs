//! Result payloads delivered to command completions.
//!
//! [`CallbackInfo`] is a closed union of every payload a correlated event
//! can carry. The router never guesses which variant an envelope holds:
//! it decodes with the [`ResultKind`] recorded when the transaction was
//! registered, so a payload for the wrong kind is a modeled
//! [`DecodeError::Mismatch`] rather than a silent failed downcast.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::EventType;
use super::geometry::{AngleVector, LpsPosition, Vector2, Vector3};
use crate::error::DeviceError;

/// Result type a transaction expects, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// `look_at` completion.
    LookAt,
    /// `say` completion.
    Say,
    /// `get_config` result.
    GetConfig,
    /// `set_config` result.
    SetConfig,
    /// `swap_view` result.
    Display,
    /// `load_asset` result.
    FetchAsset,
    /// `listen_for_speech` result.
    Listen,
    /// `listen_for_gesture` deliveries.
    ScreenGesture,
    /// `subscribe_motion` deliveries.
    Motion,
    /// `subscribe_head_touch` deliveries.
    HeadTouch,
    /// `subscribe_face` deliveries.
    TrackedEntity,
    /// `take_photo` URI phase.
    TakePhoto,
    /// `take_video` URI phase.
    VideoReady,
}

impl ResultKind {
    /// Returns `true` if `event_type` may terminate or feed a transaction
    /// of this kind.
    #[must_use]
    pub const fn accepts(&self, event_type: EventType) -> bool {
        use EventType as E;
        match self {
            Self::LookAt => matches!(event_type, E::LookAtAchieved | E::TrackEntityLost),
            Self::Say => matches!(event_type, E::AsyncStop),
            Self::GetConfig | Self::SetConfig => matches!(event_type, E::Config),
            Self::Display => matches!(event_type, E::ViewStateChange),
            Self::FetchAsset => matches!(event_type, E::AssetReady | E::AssetFailed),
            Self::Listen => matches!(
                event_type,
                E::ListenResult | E::ListenStop | E::HotWordHeard
            ),
            Self::ScreenGesture => matches!(event_type, E::ScreenTap | E::ScreenSwipe),
            Self::Motion => matches!(event_type, E::MotionDetected),
            Self::HeadTouch => matches!(event_type, E::HeadTouched),
            Self::TrackedEntity => {
                matches!(event_type, E::TrackUpdate | E::TrackLost | E::TrackGained)
            }
            Self::TakePhoto => matches!(event_type, E::TakePhoto),
            Self::VideoReady => matches!(event_type, E::VideoReady),
        }
    }

    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LookAt => "look_at",
            Self::Say => "say",
            Self::GetConfig => "get_config",
            Self::SetConfig => "set_config",
            Self::Display => "display",
            Self::FetchAsset => "fetch_asset",
            Self::Listen => "listen",
            Self::ScreenGesture => "screen_gesture",
            Self::Motion => "motion",
            Self::HeadTouch => "head_touch",
            Self::TrackedEntity => "tracked_entity",
            Self::TakePhoto => "take_photo",
            Self::VideoReady => "video_ready",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The robot reached its `look_at` target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookAtAchievedInfo {
    /// Target in the robot's 3-D base frame.
    #[serde(default)]
    pub position_target: Option<Vector3>,
    /// Target orientation.
    #[serde(default)]
    pub angle_target: Option<AngleVector>,
    /// Event that completed the command.
    #[serde(skip)]
    pub event_type: EventType,
}

/// The robot finished speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SayCompletedInfo {
    /// Event that completed the command.
    pub event_type: EventType,
}

/// Battery status reported by `get_config`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BatteryInfo {
    /// Charge level in `[0, 1]`.
    #[serde(default)]
    pub level: f64,
    /// Whether the robot is on its charger.
    #[serde(default)]
    pub charging: bool,
}

/// Wifi status reported by `get_config`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WifiInfo {
    /// Signal strength in `[0, 1]`.
    #[serde(default)]
    pub strength: f64,
}

/// Robot configuration snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Master volume in `[0, 1]`.
    #[serde(default)]
    pub mixer: Option<f64>,
    /// Battery status.
    #[serde(default)]
    pub battery: Option<BatteryInfo>,
    /// Wifi status.
    #[serde(default)]
    pub wifi: Option<WifiInfo>,
}

/// Result of `get_config`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetConfigInfo {
    /// Configuration snapshot.
    #[serde(default)]
    pub info: ConfigInfo,
}

/// Result of `set_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetConfigInfo {
    /// `true` if the robot applied the options.
    #[serde(default)]
    pub succeed: bool,
}

/// State of a display view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisplayViewState {
    /// The view is on screen.
    Opened,
    /// The view was taken off screen.
    Closed,
}

/// Result of `swap_view`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplayInfo {
    /// Current display state.
    #[serde(default)]
    pub state: Option<DisplayViewState>,
}

/// Result of `load_asset`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchAssetInfo {
    /// Asset details reported by the robot.
    #[serde(default)]
    pub detail: Option<String>,
}

/// Kind of entity the robot identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// A person who is a member of the robot's loop.
    LoopMember,
    /// A person the robot does not know.
    Person,
    /// Anything else.
    #[serde(other)]
    Unknown,
}

/// Identity guess for a speaker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerId {
    /// Entity classification.
    #[serde(default, rename = "type")]
    pub entity_type: Option<EntityType>,
    /// Confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Who spoke and where from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speaker {
    /// Where the speech came from.
    #[serde(default)]
    pub lps_position: Option<LpsPosition>,
    /// Who the speech came from.
    #[serde(default, rename = "speakerID")]
    pub speaker_id: Option<SpeakerId>,
}

/// Recognised speech.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechInfo {
    /// Transcribed text.
    #[serde(default)]
    pub speech: Option<String>,
    /// Language of the utterance.
    #[serde(default)]
    pub language_code: Option<String>,
    /// Speaker, when identified.
    #[serde(default)]
    pub speaker: Option<Speaker>,
}

/// Hot word detection details.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HotWordInfo {
    /// Speaker, when identified.
    #[serde(default)]
    pub speaker: Option<Speaker>,
}

/// Why listening stopped without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListenStopReason {
    /// Nobody spoke before the no-speech timeout.
    MaxNoSpeech,
    /// The speaker exceeded the maximum speech duration.
    MaxSpeech,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenStopPayload {
    stop_reason: ListenStopReason,
}

/// What the listen transaction produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListenType {
    /// Regular speech.
    Speech(SpeechInfo),
    /// The hot word.
    HotWord(HotWordInfo),
    /// Listening stopped.
    Stop {
        /// Stop reason.
        reason: ListenStopReason,
    },
}

/// Result of `listen_for_speech`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListenInfo {
    /// What was heard.
    pub listen_type: ListenType,
}

/// Swipe direction on the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwipeDirection {
    /// Upward swipe.
    Up,
    /// Downward swipe.
    Down,
    /// Leftward swipe.
    Left,
    /// Rightward swipe.
    Right,
}

#[derive(Debug, Deserialize)]
struct TapPayload {
    coordinate: Vector2,
}

#[derive(Debug, Deserialize)]
struct SwipePayload {
    direction: SwipeDirection,
    #[serde(default)]
    velocity: Vector2,
}

/// A screen gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScreenGesture {
    /// Tap at a screen coordinate.
    Tap {
        /// Where the screen was tapped.
        coordinate: Vector2,
    },
    /// Swipe in a direction.
    Swipe {
        /// Swipe direction.
        direction: SwipeDirection,
        /// Swipe velocity.
        velocity: Vector2,
    },
}

/// Delivery of `listen_for_gesture`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScreenGestureInfo {
    /// Gesture performed.
    pub gesture: ScreenGesture,
}

/// One moving region in the robot's field of view.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionEntity {
    /// Relative amount of motion in `[0, 1]`.
    #[serde(default)]
    pub intensity: Option<f64>,
    /// Where the motion is.
    #[serde(default)]
    pub lps_position: Option<LpsPosition>,
}

/// Delivery of `subscribe_motion`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionInfo {
    /// Regions that moved.
    #[serde(default)]
    pub motions: Vec<MotionEntity>,
}

/// The six head touch sensors, three down each side of the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[bool; 6]", into = "[bool; 6]")]
pub struct HeadSensors {
    /// Sensor 0.
    pub left_front: bool,
    /// Sensor 1.
    pub left_middle: bool,
    /// Sensor 2.
    pub left_back: bool,
    /// Sensor 3.
    pub right_front: bool,
    /// Sensor 4.
    pub right_middle: bool,
    /// Sensor 5.
    pub right_back: bool,
}

impl HeadSensors {
    /// Returns `true` if any sensor is touched.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.left_front
            || self.left_middle
            || self.left_back
            || self.right_front
            || self.right_middle
            || self.right_back
    }
}

impl From<[bool; 6]> for HeadSensors {
    fn from(s: [bool; 6]) -> Self {
        let [left_front, left_middle, left_back, right_front, right_middle, right_back] = s;
        Self {
            left_front,
            left_middle,
            left_back,
            right_front,
            right_middle,
            right_back,
        }
    }
}

impl From<HeadSensors> for [bool; 6] {
    fn from(h: HeadSensors) -> Self {
        [
            h.left_front,
            h.left_middle,
            h.left_back,
            h.right_front,
            h.right_middle,
            h.right_back,
        ]
    }
}

/// Delivery of `subscribe_head_touch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadTouchInfo {
    /// Sensor states.
    pub head_sensors: HeadSensors,
}

/// One entity tracked by the perception system.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    /// Robot-local entity id, usable as a `look_at` target.
    #[serde(default)]
    pub entity_id: Option<u32>,
    /// Classification.
    #[serde(default, rename = "type")]
    pub entity_type: Option<EntityType>,
    /// Confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Where the entity is.
    #[serde(default)]
    pub lps_position: Option<LpsPosition>,
}

/// Delivery of `subscribe_face`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackedEntityInfo {
    /// Gained, updated or lost.
    #[serde(skip)]
    pub event_type: EventType,
    /// Entities in this update.
    #[serde(default)]
    pub tracks: Vec<TrackedEntity>,
}

/// URI phase of `take_photo`: the photo exists on the robot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoReadyInfo {
    /// Path of the photo on the robot's media server.
    pub uri: String,
    /// Name of the photo in the robot's local cache.
    #[serde(default)]
    pub name: Option<String>,
    /// Where the robot was looking.
    #[serde(default)]
    pub position_target: Option<Vector3>,
    /// Orientation when the photo was taken.
    #[serde(default)]
    pub angle_target: Option<AngleVector>,
}

/// URI phase of `take_video`: the stream is available.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoReadyInfo {
    /// Path of the stream on the robot's media server.
    pub uri: String,
}

/// Closed union of every payload a correlated event can carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "info", rename_all = "snake_case")]
pub enum CallbackInfo {
    /// See [`LookAtAchievedInfo`].
    LookAtAchieved(LookAtAchievedInfo),
    /// See [`SayCompletedInfo`].
    SayCompleted(SayCompletedInfo),
    /// See [`GetConfigInfo`].
    GetConfig(GetConfigInfo),
    /// See [`SetConfigInfo`].
    SetConfig(SetConfigInfo),
    /// See [`DisplayInfo`].
    Display(DisplayInfo),
    /// See [`FetchAssetInfo`].
    FetchAsset(FetchAssetInfo),
    /// See [`ListenInfo`].
    Listen(ListenInfo),
    /// See [`ScreenGestureInfo`].
    ScreenGesture(ScreenGestureInfo),
    /// See [`MotionInfo`].
    Motion(MotionInfo),
    /// See [`HeadTouchInfo`].
    HeadTouch(HeadTouchInfo),
    /// See [`TrackedEntityInfo`].
    TrackedEntity(TrackedEntityInfo),
    /// See [`PhotoReadyInfo`].
    TakePhoto(PhotoReadyInfo),
    /// See [`VideoReadyInfo`].
    VideoReady(VideoReadyInfo),
}

impl CallbackInfo {
    /// Returns the result kind this payload satisfies.
    #[must_use]
    pub const fn kind(&self) -> ResultKind {
        match self {
            Self::LookAtAchieved(_) => ResultKind::LookAt,
            Self::SayCompleted(_) => ResultKind::Say,
            Self::GetConfig(_) => ResultKind::GetConfig,
            Self::SetConfig(_) => ResultKind::SetConfig,
            Self::Display(_) => ResultKind::Display,
            Self::FetchAsset(_) => ResultKind::FetchAsset,
            Self::Listen(_) => ResultKind::Listen,
            Self::ScreenGesture(_) => ResultKind::ScreenGesture,
            Self::Motion(_) => ResultKind::Motion,
            Self::HeadTouch(_) => ResultKind::HeadTouch,
            Self::TrackedEntity(_) => ResultKind::TrackedEntity,
            Self::TakePhoto(_) => ResultKind::TakePhoto,
            Self::VideoReady(_) => ResultKind::VideoReady,
        }
    }
}

/// A payload type that can be extracted from a [`CallbackInfo`].
///
/// Implemented for every `*Info` struct; used by
/// [`super::dispatcher::Callback`] to type-check deliveries.
pub trait ResultPayload: Sized + Send + 'static {
    /// Kind recorded in the registry for transactions expecting `Self`.
    const KIND: ResultKind;

    /// Extracts `Self` if `info` is the matching variant.
    fn from_info(info: CallbackInfo) -> Option<Self>;
}

macro_rules! result_payload {
    ($($ty:ty => $variant:ident, $kind:ident;)+) => {
        $(
            impl ResultPayload for $ty {
                const KIND: ResultKind = ResultKind::$kind;

                fn from_info(info: CallbackInfo) -> Option<Self> {
                    match info {
                        CallbackInfo::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )+
    };
}

result_payload! {
    LookAtAchievedInfo => LookAtAchieved, LookAt;
    SayCompletedInfo => SayCompleted, Say;
    GetConfigInfo => GetConfig, GetConfig;
    SetConfigInfo => SetConfig, SetConfig;
    DisplayInfo => Display, Display;
    FetchAssetInfo => FetchAsset, FetchAsset;
    ListenInfo => Listen, Listen;
    ScreenGestureInfo => ScreenGesture, ScreenGesture;
    MotionInfo => Motion, Motion;
    HeadTouchInfo => HeadTouch, HeadTouch;
    TrackedEntityInfo => TrackedEntity, TrackedEntity;
    PhotoReadyInfo => TakePhoto, TakePhoto;
    VideoReadyInfo => VideoReady, VideoReady;
}

/// Outcome of decoding one correlated payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A result for the transaction.
    Info(CallbackInfo),
    /// The robot reported that the command failed.
    Failure(DeviceError),
    /// A non-terminal progress notification (`onStart`).
    Progress,
}

/// Why a correlated payload could not be turned into a [`Decoded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The event type does not belong to the expected kind.
    Mismatch {
        /// Kind recorded at registration.
        expected: ResultKind,
        /// Event type that arrived.
        actual: EventType,
    },
    /// The event tag was not recognised.
    UnknownEvent,
    /// The event type fits but its payload is malformed.
    Malformed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { expected, actual } => {
                write!(f, "event {actual} does not answer a {expected} transaction")
            }
            Self::UnknownEvent => f.write_str("unrecognised event type"),
            Self::Malformed(msg) => write!(f, "malformed payload: {msg}"),
        }
    }
}

/// Decodes `payload` into the variant selected by `expected` and `event_type`.
///
/// # Errors
///
/// Returns [`DecodeError::Mismatch`] when `event_type` cannot answer an
/// `expected` transaction, [`DecodeError::UnknownEvent`] for an
/// unrecognised tag, and [`DecodeError::Malformed`] when the payload does
/// not have the shape the event type requires.
pub fn decode(
    expected: ResultKind,
    event_type: EventType,
    payload: &serde_json::Value,
) -> Result<Decoded, DecodeError> {
    match event_type {
        EventType::Undefined => return Err(DecodeError::UnknownEvent),
        EventType::AsyncStart => return Ok(Decoded::Progress),
        EventType::AsyncError => return parse::<DeviceError>(payload).map(Decoded::Failure),
        _ => {}
    }

    if !expected.accepts(event_type) {
        return Err(DecodeError::Mismatch {
            expected,
            actual: event_type,
        });
    }

    let info = match (expected, event_type) {
        (ResultKind::LookAt, EventType::TrackEntityLost)
        | (ResultKind::FetchAsset, EventType::AssetFailed) => {
            let mut failure = parse::<DeviceError>(payload)?;
            if failure.message.is_empty() {
                failure.message = event_type.as_str().to_string();
            }
            return Ok(Decoded::Failure(failure));
        }
        (ResultKind::LookAt, _) => {
            let mut info = parse::<LookAtAchievedInfo>(payload)?;
            info.event_type = event_type;
            CallbackInfo::LookAtAchieved(info)
        }
        (ResultKind::Say, _) => CallbackInfo::SayCompleted(SayCompletedInfo { event_type }),
        (ResultKind::GetConfig, _) => CallbackInfo::GetConfig(parse(payload)?),
        (ResultKind::SetConfig, _) => CallbackInfo::SetConfig(parse(payload)?),
        (ResultKind::Display, _) => CallbackInfo::Display(parse(payload)?),
        (ResultKind::FetchAsset, _) => CallbackInfo::FetchAsset(parse(payload)?),
        (ResultKind::Listen, EventType::ListenStop) => {
            let stop = parse::<ListenStopPayload>(payload)?;
            CallbackInfo::Listen(ListenInfo {
                listen_type: ListenType::Stop {
                    reason: stop.stop_reason,
                },
            })
        }
        (ResultKind::Listen, EventType::HotWordHeard) => CallbackInfo::Listen(ListenInfo {
            listen_type: ListenType::HotWord(parse(payload)?),
        }),
        (ResultKind::Listen, _) => CallbackInfo::Listen(ListenInfo {
            listen_type: ListenType::Speech(parse(payload)?),
        }),
        (ResultKind::ScreenGesture, EventType::ScreenTap) => {
            let tap = parse::<TapPayload>(payload)?;
            CallbackInfo::ScreenGesture(ScreenGestureInfo {
                gesture: ScreenGesture::Tap {
                    coordinate: tap.coordinate,
                },
            })
        }
        (ResultKind::ScreenGesture, _) => {
            let swipe = parse::<SwipePayload>(payload)?;
            CallbackInfo::ScreenGesture(ScreenGestureInfo {
                gesture: ScreenGesture::Swipe {
                    direction: swipe.direction,
                    velocity: swipe.velocity,
                },
            })
        }
        (ResultKind::Motion, _) => CallbackInfo::Motion(parse(payload)?),
        (ResultKind::HeadTouch, _) => CallbackInfo::HeadTouch(parse(payload)?),
        (ResultKind::TrackedEntity, _) => {
            let mut info = parse::<TrackedEntityInfo>(payload)?;
            info.event_type = event_type;
            CallbackInfo::TrackedEntity(info)
        }
        (ResultKind::TakePhoto, _) => CallbackInfo::TakePhoto(parse(payload)?),
        (ResultKind::VideoReady, _) => CallbackInfo::VideoReady(parse(payload)?),
    };

    Ok(Decoded::Info(info))
}

/// Parses a payload, treating `null` as an empty object.
fn parse<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, DecodeError> {
    let result = if payload.is_null() {
        serde_json::from_value(serde_json::Value::Object(serde_json::Map::new()))
    } else {
        T::deserialize(payload)
    };
    result.map_err(|e| DecodeError::Malformed(e.to_string()))
}
