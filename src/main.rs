//! robot-toolkit demo.
//!
//! Drives a session against the in-memory transport: signs in, connects,
//! issues a few commands and plays the robot's side of the conversation.

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use robot_toolkit::config::SessionConfig;
use robot_toolkit::domain::command::{PhotoParams, TextView};
use robot_toolkit::domain::{EventEnvelope, EventType, LookAt, SessionEvent, Vector3};
use robot_toolkit::service::RobotSession;
use robot_toolkit::transport::memory::{MemoryAuthenticator, MemoryMediaFetcher, MemoryTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = SessionConfig::from_env()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("loading configuration")?;
    tracing::info!(simulator = config.simulator, "starting robot-toolkit demo");

    // Build collaborators
    let transport = Arc::new(MemoryTransport::new());
    let session = RobotSession::new(
        config,
        Arc::clone(&transport) as _,
        Arc::new(MemoryAuthenticator::new()),
        Arc::new(MemoryMediaFetcher::new()),
    )?;

    // Log connection state changes
    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SessionEvent::ConnectionStateChanged { state, reason, .. } = event {
                tracing::info!(?state, reason, "session state");
            }
        }
    });

    // Sign in and connect
    if !session.sign_in().await? {
        anyhow::bail!("sign-in declined");
    }
    let robots = session.get_robots().await?;
    let info = robots.first().context("no robots on the account")?;
    let robot = session.get_ip_address(info).await?;
    session.connect(robot).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let commands = session.commands();

    let look = tx.clone();
    let look_id = commands
        .look_at(LookAt::position(Vector3::new(1.0, 0.0, 0.5)), move |r| {
            let _ = look.send(format!("look_at: {r:?}"));
        })
        .context("look_at refused")?;

    let view = tx.clone();
    let view_id = commands
        .swap_view(
            TextView {
                text: "Hello".to_string(),
                view: "greeting".to_string(),
            },
            move |r| {
                let _ = view.send(format!("swap_view: {r:?}"));
            },
        )
        .context("swap_view refused")?;

    let photo = tx.clone();
    let photo_id = commands
        .take_photo(PhotoParams::default(), move |r| {
            let _ = photo.send(format!("take_photo: {r:?}"));
        })
        .context("take_photo refused")?;
    drop(tx);

    // Play the robot
    transport.deliver(EventEnvelope::correlated(
        EventType::LookAtAchieved,
        look_id,
        json!({ "positionTarget": [1.0, 0.0, 0.5] }),
    ));
    transport.deliver(EventEnvelope::correlated(
        EventType::ViewStateChange,
        view_id,
        json!({ "state": "opened" }),
    ));
    transport.deliver(EventEnvelope::correlated(
        EventType::TakePhoto,
        photo_id,
        json!({ "uri": "/photos/demo.jpg", "name": "demo.jpg" }),
    ));

    while let Some(line) = rx.recv().await {
        tracing::info!("{line}");
    }

    session.log_out().await?;
    Ok(())
}
