//! Session configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Programmatic callers use [`SessionConfig::default`] or
//! [`SessionConfig::simulator`] instead.

use std::net::IpAddr;

use crate::domain::{Robot, RobotInfo};

const SIMULATED_ROBOT_ID: &str = "simulatedRobot";
const SIMULATED_ROBOT_NAME: &str = "simulatedRobotName";
const SIMULATED_ROBOT_NETWORK_NAME: &str = "ImmaLittleTeapot";

/// Per-session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Redirect discovery and `connect` to the local simulator and fetch
    /// media over plain HTTP.
    pub simulator: bool,

    /// Address of the simulator.
    pub simulator_ip: IpAddr,

    /// Command port of the simulator.
    pub simulator_port: u16,

    /// Capacity of the session's event bus.
    pub event_bus_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            simulator: false,
            simulator_ip: IpAddr::from([127, 0, 0, 1]),
            simulator_port: 8160,
            event_bus_capacity: 1_024,
        }
    }
}

impl SessionConfig {
    /// Default configuration with simulator mode on.
    #[must_use]
    pub fn simulator() -> Self {
        Self {
            simulator: true,
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `ROBOT_SIMULATOR_IP` is set but cannot be parsed
    /// as an [`IpAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let simulator_ip = match std::env::var("ROBOT_SIMULATOR_IP") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.simulator_ip,
        };

        Ok(Self {
            simulator: parse_env_bool("ROBOT_SIMULATOR", defaults.simulator),
            simulator_ip,
            simulator_port: parse_env("ROBOT_SIMULATOR_PORT", defaults.simulator_port),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
        })
    }

    /// The fixed robot every simulator session talks to.
    #[must_use]
    pub fn simulated_robot(&self) -> Robot {
        Robot::new(
            self.simulator_ip.to_string(),
            self.simulator_port,
            simulated_robot_info(),
        )
    }

    /// Whether media is fetched over HTTPS.
    #[must_use]
    pub const fn secure_media(&self) -> bool {
        !self.simulator
    }
}

/// Account entry of the simulated robot.
#[must_use]
pub fn simulated_robot_info() -> RobotInfo {
    RobotInfo {
        id: Some(SIMULATED_ROBOT_ID.to_string()),
        name: Some(SIMULATED_ROBOT_NAME.to_string()),
        robot_name: Some(SIMULATED_ROBOT_NETWORK_NAME.to_string()),
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::to_ascii_lowercase) {
        Some(v) if v == "true" || v == "1" => true,
        Some(v) if v == "false" || v == "0" => false,
        _ => default,
    }
}
