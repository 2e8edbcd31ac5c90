//! Media delivered after the side-channel fetch of a capture command.

use serde::Serialize;

use super::callback_info::PhotoReadyInfo;
use super::geometry::{AngleVector, Vector3};

/// Result of `take_photo`: the photo bytes plus where it was taken.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TakePhotoInfo {
    /// Encoded image bytes as served by the robot.
    #[serde(skip)]
    pub image: Vec<u8>,
    /// Path the photo was fetched from.
    pub uri: String,
    /// Name of the photo in the robot's local cache.
    pub name: Option<String>,
    /// Where the robot was looking.
    pub position_target: Option<Vector3>,
    /// Orientation when the photo was taken.
    pub angle_target: Option<AngleVector>,
}

impl TakePhotoInfo {
    /// Combines the URI phase payload with the fetched bytes.
    #[must_use]
    pub fn from_ready(ready: PhotoReadyInfo, image: Vec<u8>) -> Self {
        Self {
            image,
            uri: ready.uri,
            name: ready.name,
            position_target: ready.position_target,
            angle_target: ready.angle_target,
        }
    }
}

impl std::fmt::Debug for TakePhotoInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TakePhotoInfo")
            .field("image_len", &self.image.len())
            .field("uri", &self.uri)
            .field("name", &self.name)
            .field("position_target", &self.position_target)
            .field("angle_target", &self.angle_target)
            .finish()
    }
}

/// One frame of a `take_video` stream.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Encoded frame bytes.
    pub data: Vec<u8>,
    /// Zero-based position in the stream.
    pub sequence: u64,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("len", &self.data.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}
