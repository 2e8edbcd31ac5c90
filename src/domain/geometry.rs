//! Vectors and positions in the robot's local perceptual space.
//!
//! All vector types travel over the wire as plain JSON arrays
//! (`[x, y, z]`, `[theta, psi]`, `[x, y]`).

use serde::{Deserialize, Serialize};

/// 3-D coordinate in the robot's base frame, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vector3 {
    /// Forward axis.
    pub x: f64,
    /// Left axis.
    pub y: f64,
    /// Up axis.
    pub z: f64,
}

impl Vector3 {
    /// Creates a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Vector3> for [f64; 3] {
    fn from(v: Vector3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// 2-D coordinate, used for screen positions and swipe velocities.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Vector2 {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component.
    pub y: f64,
}

impl Vector2 {
    /// Creates a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Vector2 {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Vector2> for [f64; 2] {
    fn from(v: Vector2) -> Self {
        [v.x, v.y]
    }
}

/// Orientation as a pair of angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct AngleVector {
    /// Horizontal rotation (twist).
    pub theta: f64,
    /// Vertical rotation (tilt).
    pub psi: f64,
}

impl AngleVector {
    /// Creates a new angle pair.
    #[must_use]
    pub const fn new(theta: f64, psi: f64) -> Self {
        Self { theta, psi }
    }
}

impl From<[f64; 2]> for AngleVector {
    fn from([theta, psi]: [f64; 2]) -> Self {
        Self { theta, psi }
    }
}

impl From<AngleVector> for [f64; 2] {
    fn from(v: AngleVector) -> Self {
        [v.theta, v.psi]
    }
}

/// Location of a face, motion or other entity in the robot's perceptual space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LpsPosition {
    /// 3-D base coordinate of the entity.
    #[serde(default)]
    pub position: Option<Vector3>,
    /// Orientation of the entity relative to the robot.
    #[serde(default)]
    pub angle_vector: Option<AngleVector>,
    /// Identification confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
}
