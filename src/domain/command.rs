//! Outbound commands and their parameter value types.
//!
//! Every capability is a flat value type ([`LookAt`], [`ImageView`],
//! [`ListenParams`], [`PhotoParams`], ...) that the command channel turns
//! into one [`Command`] variant. The transport receives it wrapped in a
//! [`CommandRequest`] carrying the transaction id.

use serde::{Deserialize, Serialize};

use super::TransactionId;
use super::geometry::{AngleVector, Vector2, Vector3};

/// Where the robot should look.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LookAtTarget {
    /// An orientation relative to the robot's base.
    Angle(AngleVector),
    /// A robot-local entity id.
    Entity(u32),
    /// A point in the robot's 3-D base frame.
    Position(Vector3),
    /// A pixel on the robot's screen.
    ScreenCoords(Vector2),
}

/// A `look_at` request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookAt {
    /// Target to look at.
    pub target: LookAtTarget,
    /// Keep following the target after reaching it.
    pub track_flag: bool,
    /// Keep the head level while moving.
    pub level_head_flag: bool,
}

impl LookAt {
    /// Looks toward an orientation.
    #[must_use]
    pub const fn angle(angle: AngleVector) -> Self {
        Self::new(LookAtTarget::Angle(angle))
    }

    /// Looks at a tracked entity.
    #[must_use]
    pub const fn entity(entity_id: u32) -> Self {
        Self::new(LookAtTarget::Entity(entity_id))
    }

    /// Looks at a 3-D position.
    #[must_use]
    pub const fn position(position: Vector3) -> Self {
        Self::new(LookAtTarget::Position(position))
    }

    /// Looks at a screen coordinate.
    #[must_use]
    pub const fn screen_coords(coords: Vector2) -> Self {
        Self::new(LookAtTarget::ScreenCoords(coords))
    }

    const fn new(target: LookAtTarget) -> Self {
        Self {
            target,
            track_flag: false,
            level_head_flag: false,
        }
    }

    /// Sets the tracking flag.
    #[must_use]
    pub const fn with_track(mut self, track: bool) -> Self {
        self.track_flag = track;
        self
    }

    /// Sets the level-head flag.
    #[must_use]
    pub const fn with_level_head(mut self, level_head: bool) -> Self {
        self.level_head_flag = level_head;
        self
    }
}

/// Image shown by `swap_view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageView {
    /// Asset name.
    pub name: String,
    /// Source URL.
    pub source: String,
    /// Asset set name.
    pub set: String,
    /// Unique view name.
    pub view: String,
}

/// Text shown by `swap_view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextView {
    /// Text to display.
    pub text: String,
    /// Unique view name.
    pub view: String,
}

/// The robot's eye, shown by `swap_view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyeView {
    /// Unique view name.
    pub view: String,
}

/// Any view `swap_view` can put on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DisplayView {
    /// See [`ImageView`].
    Image(ImageView),
    /// See [`TextView`].
    Text(TextView),
    /// See [`EyeView`].
    Eye(EyeView),
}

impl From<ImageView> for DisplayView {
    fn from(v: ImageView) -> Self {
        Self::Image(v)
    }
}

impl From<TextView> for DisplayView {
    fn from(v: TextView) -> Self {
        Self::Text(v)
    }
}

impl From<EyeView> for DisplayView {
    fn from(v: EyeView) -> Self {
        Self::Eye(v)
    }
}

/// Parameters for `listen_for_speech`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenParams {
    /// Maximum utterance length in seconds.
    pub max_speech_timeout: u32,
    /// Seconds to wait for speech to begin.
    pub max_no_speech_timeout: u32,
    /// Recognition language.
    pub language_code: String,
}

impl Default for ListenParams {
    fn default() -> Self {
        Self {
            max_speech_timeout: 15,
            max_no_speech_timeout: 15,
            language_code: "en-US".to_string(),
        }
    }
}

/// Gesture kind accepted by a screen gesture subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GestureKind {
    /// Taps.
    #[default]
    Tap,
    /// Swipes.
    Swipe,
}

/// Rectangular region of the screen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenArea {
    /// Left edge in pixels.
    pub x: f64,
    /// Top edge in pixels.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

/// Parameters for `listen_for_gesture`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenGestureParams {
    /// Gesture kind to report.
    #[serde(rename = "type")]
    pub kind: GestureKind,
    /// Only report gestures in this area.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<ScreenArea>,
}

/// Which camera takes a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Camera {
    /// Left camera.
    #[default]
    Left,
    /// Right camera.
    Right,
}

/// Photo resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CameraResolution {
    /// Highest resolution.
    HighRes,
    /// Medium resolution.
    MedRes,
    /// Low resolution.
    #[default]
    LowRes,
    /// Thumbnail resolution.
    MicroRes,
}

/// Parameters for `take_photo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoParams {
    /// Camera to use.
    pub camera: Camera,
    /// Resolution.
    pub resolution: CameraResolution,
    /// `true` for a rectified image, `false` for raw fisheye.
    pub distortion: bool,
}

impl Default for PhotoParams {
    fn default() -> Self {
        Self {
            camera: Camera::Left,
            resolution: CameraResolution::LowRes,
            distortion: true,
        }
    }
}

/// Video stream flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoType {
    /// Regular camera feed.
    #[default]
    Normal,
    /// Debug overlay feed.
    Debug,
}

/// Parameters for `take_video`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParams {
    /// Stream flavor.
    pub video_type: VideoType,
    /// Requested duration in seconds; `0` streams until cancelled.
    pub duration: f64,
}

/// Options accepted by `set_config`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SetConfigOptions {
    /// Master volume in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixer: Option<f64>,
}

/// One outbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Move the head toward a target.
    LookAt(LookAt),
    /// Speak a phrase.
    Say {
        /// Plain text or markup.
        phrase: String,
    },
    /// Read the robot configuration.
    GetConfig,
    /// Change the robot configuration.
    SetConfig {
        /// Options to apply.
        options: SetConfigOptions,
    },
    /// Put a view on screen.
    Display {
        /// View to show.
        view: DisplayView,
    },
    /// Fetch an external asset into the robot's cache.
    FetchAsset {
        /// Asset location.
        uri: String,
        /// Cache name.
        name: String,
    },
    /// Listen for speech.
    Listen(ListenParams),
    /// Subscribe to screen gestures.
    ScreenGesture(ScreenGestureParams),
    /// Subscribe to motion.
    Motion,
    /// Subscribe to head touches.
    HeadTouch,
    /// Subscribe to tracked entities.
    Entity,
    /// Take a photo.
    TakePhoto(PhotoParams),
    /// Start a video stream.
    Video(VideoParams),
}

impl Command {
    /// Returns the wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LookAt(_) => "LookAt",
            Self::Say { .. } => "Say",
            Self::GetConfig => "GetConfig",
            Self::SetConfig { .. } => "SetConfig",
            Self::Display { .. } => "Display",
            Self::FetchAsset { .. } => "FetchAsset",
            Self::Listen(_) => "Listen",
            Self::ScreenGesture(_) => "ScreenGesture",
            Self::Motion => "Motion",
            Self::HeadTouch => "HeadTouch",
            Self::Entity => "Entity",
            Self::TakePhoto(_) => "TakePhoto",
            Self::Video(_) => "Video",
        }
    }
}

/// A command addressed to one transaction, as handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Transaction the robot will answer.
    pub transaction_id: TransactionId,
    /// Command body.
    pub command: Command,
}
