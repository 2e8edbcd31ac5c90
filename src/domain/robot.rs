//! Robot identity values produced by discovery and consumed by `connect`.

use serde::{Deserialize, Serialize};

/// Account-level description of a robot, as returned by the robot list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotInfo {
    /// Cloud identifier of the robot.
    pub id: Option<String>,
    /// Owner-facing display name.
    pub name: Option<String>,
    /// Network name printed on the robot base (`my-robot.local`).
    pub robot_name: Option<String>,
}

/// A reachable robot: its address plus identity.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Robot {
    ip: String,
    port: u16,
    info: RobotInfo,
}

impl Robot {
    /// Creates a robot value.
    #[must_use]
    pub const fn new(ip: String, port: u16, info: RobotInfo) -> Self {
        Self { ip, port, info }
    }

    /// IP address or host name.
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Command port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Account-level identity.
    #[must_use]
    pub const fn info(&self) -> &RobotInfo {
        &self.info
    }

    /// Owner-facing display name, if known.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.info.name.as_deref()
    }

    /// Network name, if known.
    #[must_use]
    pub fn robot_name(&self) -> Option<&str> {
        self.info.robot_name.as_deref()
    }

    /// Builds the side-channel URL for a media URI returned by the robot.
    #[must_use]
    pub fn media_url(&self, secure: bool, uri: &str) -> String {
        let scheme = if secure { "https" } else { "http" };
        let separator = if uri.starts_with('/') { "" } else { "/" };
        format!("{scheme}://{}:{}{separator}{uri}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot() -> Robot {
        Robot::new(
            "10.0.0.7".to_string(),
            8160,
            RobotInfo {
                id: Some("r-1".to_string()),
                name: Some("Kitchen".to_string()),
                robot_name: Some("kitchen-bot".to_string()),
            },
        )
    }

    #[test]
    fn accessors_expose_identity() {
        let r = robot();
        assert_eq!(r.ip(), "10.0.0.7");
        assert_eq!(r.port(), 8160);
        assert_eq!(r.name(), Some("Kitchen"));
        assert_eq!(r.robot_name(), Some("kitchen-bot"));
    }

    #[test]
    fn media_url_uses_scheme_and_port() {
        let r = robot();
        assert_eq!(
            r.media_url(true, "/media/abc.jpg"),
            "https://10.0.0.7:8160/media/abc.jpg"
        );
        assert_eq!(
            r.media_url(false, "media/abc.jpg"),
            "http://10.0.0.7:8160/media/abc.jpg"
        );
    }
}
